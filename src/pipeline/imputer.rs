use tracing::info;

use crate::data::types::{Scalar, TimeSeriesFrame};
use crate::pipeline::schema::ColumnPrefix;
use crate::pipeline::{PipelineError, TARGET_COLUMN};

fn forward_fill(values: &mut [Option<Scalar>]) {
    let mut last: Option<Scalar> = None;
    for value in values.iter_mut() {
        match value {
            Some(v) => last = Some(v.clone()),
            None => *value = last.clone(),
        }
    }
}

/// Fills the leading gap with the first known value.
fn back_fill(values: &mut [Option<Scalar>]) {
    let mut next: Option<Scalar> = None;
    for value in values.iter_mut().rev() {
        match value {
            Some(v) => next = Some(v.clone()),
            None => *value = next.clone(),
        }
    }
}

/// Imputes the numeric (and lag) columns, then splits into
/// `(training, live)`.
///
/// Back-fill only touches the warm-up rows at the start of history that
/// forward-fill cannot reach. The target column is never imputed; the
/// training frame keeps the rows where it is defined and the live frame
/// keeps every row.
pub fn split(mut frame: TimeSeriesFrame) -> Result<(TimeSeriesFrame, TimeSeriesFrame), PipelineError> {
    info!(
        "✅ Imputing missing values. {} rows and {} columns.",
        frame.len(),
        frame.width()
    );

    let numeric: Vec<String> = frame
        .column_names()
        .into_iter()
        .filter(|name| ColumnPrefix::of(name) == Some(ColumnPrefix::Numeric))
        .map(str::to_string)
        .collect();
    for name in &numeric {
        if let Some(column) = frame.column_mut(name) {
            forward_fill(&mut column.values);
            back_fill(&mut column.values);
        }
    }

    let target = frame.column(TARGET_COLUMN).ok_or_else(|| {
        PipelineError::InputData(format!("column '{}' is missing before split", TARGET_COLUMN))
    })?;
    let labeled: Vec<bool> = target.values.iter().map(Option::is_some).collect();
    let training = frame.filter_rows(&labeled);

    if let Some(last) = training.dates().last() {
        info!("📊 Training data up to {} ({} obs)", last, training.len());
    }
    if let Some(last) = frame.dates().last() {
        info!("🚀 Live data up to {} ({} obs)", last, frame.len());
    }

    Ok((training, frame))
}
