use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::config::SchemaConfig;
use crate::data::types::TimeSeriesFrame;
use crate::pipeline::PipelineError;

/// Column categories, each with its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnPrefix {
    Identifier,
    Date,
    Numeric,
    Categorical,
    Text,
    Geo,
    Target,
}

impl ColumnPrefix {
    pub const ALL: [ColumnPrefix; 7] = [
        ColumnPrefix::Identifier,
        ColumnPrefix::Date,
        ColumnPrefix::Numeric,
        ColumnPrefix::Categorical,
        ColumnPrefix::Text,
        ColumnPrefix::Geo,
        ColumnPrefix::Target,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnPrefix::Identifier => "id_",
            ColumnPrefix::Date => "date_",
            ColumnPrefix::Numeric => "num_",
            ColumnPrefix::Categorical => "cat_",
            ColumnPrefix::Text => "text_",
            ColumnPrefix::Geo => "geo_",
            ColumnPrefix::Target => "tgt_",
        }
    }

    /// Category of a normalized column name. `None` when the name has no
    /// recognized prefix or stacks more than one.
    pub fn of(name: &str) -> Option<ColumnPrefix> {
        let caps = prefix_regex().captures(name)?;
        let rest = caps.get(2)?.as_str();
        if prefix_regex().is_match(rest) {
            return None;
        }
        let prefix = caps.get(1)?.as_str();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().trim_end_matches('_') == prefix)
    }
}

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(id|date|num|cat|text|geo|tgt)_(.+)$").expect("prefix pattern is valid")
    })
}

/// Raw column name -> prefixed name, built from the per-category lists.
pub fn mapping_from_config(schema: &SchemaConfig) -> HashMap<String, String> {
    let groups: [(ColumnPrefix, &Vec<String>); 7] = [
        (ColumnPrefix::Identifier, &schema.identifier),
        (ColumnPrefix::Date, &schema.date),
        (ColumnPrefix::Numeric, &schema.numeric),
        (ColumnPrefix::Categorical, &schema.categorical),
        (ColumnPrefix::Text, &schema.text),
        (ColumnPrefix::Geo, &schema.geo),
        (ColumnPrefix::Target, &schema.target),
    ];

    groups
        .into_iter()
        .flat_map(|(prefix, cols)| {
            cols.iter()
                .map(move |c| (c.clone(), format!("{}{}", prefix.as_str(), c)))
        })
        .collect()
}

/// Renames the columns present in `mapping`; absent ones are skipped and
/// values are left untouched.
pub fn normalize(mut frame: TimeSeriesFrame, mapping: &HashMap<String, String>) -> TimeSeriesFrame {
    let present: HashMap<String, String> = mapping
        .iter()
        .filter(|(raw, _)| frame.has_column(raw))
        .map(|(raw, renamed)| (raw.clone(), renamed.clone()))
        .collect();
    frame.rename_columns(&present);

    info!(
        "✅ Columns renamed by type: {} of {} mapped",
        present.len(),
        frame.width()
    );
    frame
}

/// Fails with every column lacking exactly one recognized prefix.
pub fn validate(frame: &TimeSeriesFrame) -> Result<(), PipelineError> {
    let offenders: Vec<String> = frame
        .column_names()
        .into_iter()
        .filter(|name| ColumnPrefix::of(name).is_none())
        .map(str::to_string)
        .collect();

    if offenders.is_empty() {
        Ok(())
    } else {
        warn!(columns = ?offenders, "Schema violation after normalization");
        Err(PipelineError::SchemaViolation(offenders))
    }
}
