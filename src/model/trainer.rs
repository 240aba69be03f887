use tracing::info;

use crate::config::ModelConfig;
use crate::data::types::TimeSeriesFrame;
use crate::model::{GradientBoostedRegressor, ModelError, Regressor};
use crate::pipeline::schema::ColumnPrefix;
use crate::pipeline::PipelineError;

/// A fitted regressor together with the column layout it was trained on.
pub struct TrainedModel {
    regressor: Box<dyn Regressor>,
    feature_columns: Vec<String>,
    target_column: String,
    training_rows: usize,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("feature_columns", &self.feature_columns)
            .field("target_column", &self.target_column)
            .field("training_rows", &self.training_rows)
            .finish()
    }
}

impl TrainedModel {
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    /// Feature vector of `row`, in training column order.
    pub fn feature_vector(&self, frame: &TimeSeriesFrame, row: usize) -> Result<Vec<f64>, ModelError> {
        feature_row(frame, &self.feature_columns, row)
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        self.regressor.predict(features)
    }
}

/// Every numeric column of the frame, in frame order.
pub fn feature_columns(frame: &TimeSeriesFrame) -> Vec<String> {
    frame
        .column_names()
        .into_iter()
        .filter(|name| ColumnPrefix::of(name) == Some(ColumnPrefix::Numeric))
        .map(str::to_string)
        .collect()
}

fn feature_row(frame: &TimeSeriesFrame, columns: &[String], row: usize) -> Result<Vec<f64>, ModelError> {
    columns
        .iter()
        .map(|name| {
            frame
                .column(name)
                .and_then(|c| c.as_f64(row))
                .ok_or_else(|| ModelError::MissingFeature(name.clone()))
        })
        .collect()
}

/// Fits the bundled gradient-boosted regressor.
pub fn fit(
    training: &TimeSeriesFrame,
    feature_columns: &[String],
    target_column: &str,
    hyperparameters: &ModelConfig,
) -> Result<TrainedModel, PipelineError> {
    fit_with(
        Box::new(GradientBoostedRegressor::new(hyperparameters.clone())),
        training,
        feature_columns,
        target_column,
    )
}

/// Fits any regressor on the training frame.
pub fn fit_with(
    mut regressor: Box<dyn Regressor>,
    training: &TimeSeriesFrame,
    feature_columns: &[String],
    target_column: &str,
) -> Result<TrainedModel, PipelineError> {
    let target = training
        .column(target_column)
        .ok_or_else(|| PipelineError::InputData(format!("target column '{}' is missing", target_column)))?;

    let mut x = Vec::with_capacity(training.len());
    let mut y = Vec::with_capacity(training.len());
    for row in 0..training.len() {
        let value = target.as_f64(row).ok_or_else(|| {
            PipelineError::InputData(format!("target undefined at {}", training.dates()[row]))
        })?;
        let features = feature_row(training, feature_columns, row).map_err(|e| {
            PipelineError::InputData(format!("training row {}: {}", training.dates()[row], e))
        })?;
        x.push(features);
        y.push(value);
    }

    info!("Features used for training:");
    for name in feature_columns {
        info!("   - {}", name);
    }

    regressor
        .fit(&x, &y)
        .map_err(|e| PipelineError::InputData(format!("model training failed: {}", e)))?;

    if let (Some(first), Some(last)) = (training.dates().first(), training.dates().last()) {
        info!("Model trained on data from {} to {} ({} obs)", first, last, training.len());
    }

    Ok(TrainedModel {
        regressor,
        feature_columns: feature_columns.to_vec(),
        target_column: target_column.to_string(),
        training_rows: training.len(),
    })
}
