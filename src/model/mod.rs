//! Regression model seam and the bundled gradient-boosted trees.

pub mod gbdt;
pub mod trainer;
pub mod tree;

pub use gbdt::GradientBoostedRegressor;
pub use trainer::TrainedModel;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("feature '{0}' is undefined")]
    MissingFeature(String),

    #[error("non-finite value at feature index {0}")]
    NonFinite(usize),

    #[error("model has not been fitted")]
    NotFitted,
}

/// A trainable point predictor.
///
/// Implementations must be deterministic: identical inputs (and seed)
/// produce identical predictions.
pub trait Regressor: Send + Sync {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError>;

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}
