//! Gradient boosted regression trees (squared loss).
//!
//! Each round fits a shallow tree to the current residuals on a seeded
//! random subset of rows and columns, and adds it with shrinkage.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::config::ModelConfig;
use crate::model::tree::{RegressionTree, TreeParams};
use crate::model::{ModelError, Regressor};

#[derive(Debug, Clone)]
pub struct GradientBoostedRegressor {
    config: ModelConfig,
    trees: Vec<RegressionTree>,
    base_prediction: f64,
    n_features: Option<usize>,
}

impl GradientBoostedRegressor {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: None,
        }
    }

    #[cfg(test)]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn sample(n: usize, ratio: f64, rng: &mut StdRng) -> Vec<usize> {
        let size = ((n as f64) * ratio.clamp(0.0, 1.0)).ceil().max(1.0) as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(size.min(n));
        indices.sort_unstable();
        indices
    }

    fn raw_predict(&self, row: &[f64]) -> f64 {
        self.base_prediction
            + self
                .trees
                .iter()
                .map(|tree| self.config.learning_rate * tree.predict(row))
                .sum::<f64>()
    }
}

impl Regressor for GradientBoostedRegressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        if features.is_empty() || targets.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.len() != targets.len() {
            return Err(ModelError::DimensionMismatch {
                expected: features.len(),
                got: targets.len(),
            });
        }
        let n_features = features[0].len();
        for row in features {
            if row.len() != n_features {
                return Err(ModelError::DimensionMismatch {
                    expected: n_features,
                    got: row.len(),
                });
            }
            if let Some(i) = row.iter().position(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite(i));
            }
        }

        let n_samples = features.len();
        self.trees.clear();
        self.base_prediction = targets.iter().sum::<f64>() / n_samples as f64;
        self.n_features = Some(n_features);

        let mut predictions = vec![self.base_prediction; n_samples];
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
        };

        for round in 0..self.config.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();

            let rows = Self::sample(n_samples, self.config.subsample, &mut rng);
            let cols = Self::sample(n_features, self.config.colsample_bytree, &mut rng);
            let tree = RegressionTree::fit(features, &residuals, &rows, &cols, params);

            for (prediction, row) in predictions.iter_mut().zip(features) {
                *prediction += self.config.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);

            if round % 100 == 0 {
                let mse = targets
                    .iter()
                    .zip(&predictions)
                    .map(|(y, p)| (y - p).powi(2))
                    .sum::<f64>()
                    / n_samples as f64;
                debug!(round, mse, "Boosting progress");
            }
        }

        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        let expected = self.n_features.ok_or(ModelError::NotFitted)?;
        if features.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                got: features.len(),
            });
        }
        if let Some(i) = features.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite(i));
        }
        Ok(self.raw_predict(features))
    }
}
