//! Data preparation: raw joined dataset in, training and live frames out.
//!
//! Stages run in a fixed order and are all-or-nothing:
//! schema normalization, completeness filter, degenerate-variable filter,
//! feature engineering, imputation and split.

pub mod completeness;
pub mod degenerate;
pub mod features;
pub mod imputer;
pub mod schema;

use tracing::info;

use crate::config::PipelineConfig;
use crate::data::types::TimeSeriesFrame;
use completeness::DroppedColumn;
use degenerate::DegenerateColumn;

pub use features::TARGET_COLUMN;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Input data error: {0}")]
    InputData(String),

    #[error("Schema violation, columns without exactly one recognized prefix: {}", .0.join(", "))]
    SchemaViolation(Vec<String>),

    #[error("Input data error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input data error: download failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Output of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    /// Rows with a defined target.
    pub training: TimeSeriesFrame,
    /// Every row, including the newest ones without a target.
    pub live: TimeSeriesFrame,
    pub dropped_incomplete: Vec<DroppedColumn>,
    /// Includes allow-listed columns that were kept, see `retained`.
    pub dropped_degenerate: Vec<DegenerateColumn>,
}

impl PreparedData {
    /// Names of every column a filter removed.
    pub fn dropped_columns(&self) -> Vec<String> {
        self.dropped_incomplete
            .iter()
            .map(|d| d.name.clone())
            .chain(
                self.dropped_degenerate
                    .iter()
                    .filter(|d| !d.retained)
                    .map(|d| d.name.clone()),
            )
            .collect()
    }
}

pub fn run(raw: TimeSeriesFrame, config: &PipelineConfig) -> Result<PreparedData, PipelineError> {
    let mapping = schema::mapping_from_config(&config.schema);
    let frame = schema::normalize(raw, &mapping);
    schema::validate(&frame)?;

    let (frame, dropped_incomplete) = completeness::filter(frame, config.completeness_threshold);
    let (frame, dropped_degenerate) = degenerate::filter(
        frame,
        config.degenerate_threshold,
        &config.degenerate_exceptions,
    );
    let frame = features::build(frame, &config.drivers, &config.target, &config.lags)?;
    let (training, live) = imputer::split(frame)?;

    info!(
        training_rows = training.len(),
        live_rows = live.len(),
        columns = live.width(),
        "Pipeline finished"
    );
    Ok(PreparedData {
        training,
        live,
        dropped_incomplete,
        dropped_degenerate,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;

    use crate::data::calendar;
    use crate::data::types::{Column, TimeSeriesFrame};

    /// Raw (unprefixed) business-day frame shaped like the joined market
    /// data: a target price, six drivers and two extra numeric series.
    pub fn raw_market_frame(rows: usize) -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = start + chrono::Duration::days((rows as i64) * 2 + 14);
        let dates: Vec<NaiveDate> = calendar::business_days(start, end).into_iter().take(rows).collect();
        assert_eq!(dates.len(), rows);

        let series = |base: f64, slope: f64, wobble: f64| -> Vec<Option<f64>> {
            (0..rows)
                .map(|i| {
                    let t = i as f64;
                    Some(((base + slope * t + wobble * (t * 0.7).sin()) * 10.0).round() / 10.0)
                })
                .collect()
        };

        let mut iron = series(120.0, 0.1, 3.0);
        // Gaps the imputer has to fill.
        iron[4] = None;
        iron[rows / 2] = None;

        let columns = vec![
            Column::numeric("rebar_price", series(540.0, 0.5, 8.0)),
            Column::numeric("aluminum_price", series(2300.0, 1.0, 20.0)),
            Column::numeric("crude_oil_price", series(75.0, -0.05, 2.0)),
            Column::numeric("copper_price", series(3.9, 0.001, 0.1)),
            Column::numeric("hot_rolled_coil_price", series(800.0, 0.8, 15.0)),
            Column::numeric("coking_coal_price", series(250.0, 0.2, 6.0)),
            Column::numeric("iron_ore_price", iron),
            Column::numeric("usd_mxn", series(17.0, 0.01, 0.3)),
            // Mostly missing: removed by the completeness filter.
            Column::numeric(
                "vix",
                (0..rows).map(|i| if i % 3 == 0 { Some(15.0) } else { None }).collect(),
            ),
        ];
        TimeSeriesFrame::with_columns(dates, columns).unwrap()
    }
}
