//! Serving control plane: credential check, per-key rate limiting,
//! single-slot forecast cache and the snapshot the forecasts come from.

pub mod auth;
pub mod clock;
pub mod prediction;
pub mod rate_limit;
pub mod snapshot;
pub mod types;

pub use prediction::PredictionService;
pub use types::{PredictionResult, ServiceError};
