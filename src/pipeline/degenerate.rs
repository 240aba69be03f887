use tracing::{debug, info};

use crate::data::types::{Scalar, TimeSeriesFrame};

/// A column whose dominant value exceeded the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct DegenerateColumn {
    pub name: String,
    pub dominant_value: Scalar,
    pub share: f64,
    /// Kept because it is on the allow-list.
    pub retained: bool,
}

/// Drops near-constant columns unless they are listed in `exceptions`.
///
/// A column is degenerate when the relative frequency of its most common
/// non-null value is above `proportion_threshold`. Ties between values go
/// to the smallest one, see `Column::mode`.
pub fn filter(
    mut frame: TimeSeriesFrame,
    proportion_threshold: f64,
    exceptions: &[String],
) -> (TimeSeriesFrame, Vec<DegenerateColumn>) {
    let degenerate: Vec<DegenerateColumn> = frame
        .columns()
        .iter()
        .filter_map(|c| {
            let (dominant_value, share) = c.mode()?;
            (share > proportion_threshold).then(|| DegenerateColumn {
                name: c.name.clone(),
                dominant_value,
                share,
                retained: exceptions.iter().any(|e| e == &c.name),
            })
        })
        .collect();

    let to_drop: Vec<&str> = degenerate
        .iter()
        .filter(|d| !d.retained)
        .map(|d| d.name.as_str())
        .collect();
    frame.drop_columns(&to_drop);

    info!(
        "✅ Degenerate-variable filter applied with threshold {}. {} columns dropped.",
        proportion_threshold,
        to_drop.len()
    );
    for d in &degenerate {
        debug!(
            column = %d.name,
            value = %d.dominant_value,
            share_pct = d.share * 100.0,
            retained = d.retained,
            "Degenerate column"
        );
    }

    (frame, degenerate)
}
