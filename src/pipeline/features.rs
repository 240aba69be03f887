use tracing::{info, warn};

use crate::data::types::{Column, Scalar, TimeSeriesFrame};
use crate::pipeline::PipelineError;

/// Raw target shifted one business day into the future.
pub const TARGET_COLUMN: &str = "target_t_plus_1";

pub const DEFAULT_LAGS: [usize; 4] = [1, 3, 5, 7];

pub fn lag_column_name(driver: &str, lag: usize) -> String {
    format!("{}_lag{}", driver, lag)
}

/// Value `lag` rows earlier; `None` for the first `lag` rows.
fn shift_back(values: &[Option<Scalar>], lag: usize) -> Vec<Option<Scalar>> {
    (0..values.len())
        .map(|i| i.checked_sub(lag).and_then(|j| values[j].clone()))
        .collect()
}

/// Value one row later; `None` for the last row.
fn shift_forward(values: &[Option<Scalar>]) -> Vec<Option<Scalar>> {
    (0..values.len())
        .map(|i| values.get(i + 1).cloned().flatten())
        .collect()
}

/// Adds `{driver}_lag{k}` columns and the `target_t_plus_1` column, then
/// removes the raw drivers and the raw target.
///
/// Every predictor left in the frame only carries information from its
/// own row or earlier; the target is the only forward-looking column.
pub fn build(
    mut frame: TimeSeriesFrame,
    drivers: &[String],
    target: &str,
    lags: &[usize],
) -> Result<TimeSeriesFrame, PipelineError> {
    let target_values = frame
        .column(target)
        .map(|c| c.values.clone())
        .ok_or_else(|| PipelineError::InputData(format!("target column '{}' is missing", target)))?;

    let mut new_columns = Vec::new();
    let mut consumed = vec![target.to_string()];

    for driver in drivers {
        let Some(column) = frame.column(driver) else {
            warn!(driver = %driver, "Driver not present after filtering, skipping lags");
            continue;
        };
        for &lag in lags {
            new_columns.push(Column::new(
                lag_column_name(driver, lag),
                shift_back(&column.values, lag),
            ));
        }
        consumed.push(driver.clone());
    }

    let names: Vec<String> = new_columns.iter().map(|c| c.name.clone()).collect();
    for column in new_columns {
        frame.push_column(column)?;
    }
    frame.push_column(Column::new(TARGET_COLUMN, shift_forward(&target_values)))?;
    frame.drop_columns(&consumed);

    info!(
        "✅ Feature engineering applied. {} rows and {} columns.",
        frame.len(),
        frame.width()
    );
    info!("📈 New columns ({}): {}", names.len() + 1, names.join(", "));

    Ok(frame)
}
