pub mod logger;
#[cfg(feature = "metrics")]
pub mod metrics;

pub use logger::PredictionLedger;
