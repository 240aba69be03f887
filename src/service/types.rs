use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::data::calendar;

pub const CURRENCY: &str = "USD";
pub const UNIT: &str = "metric ton";
pub const MODEL_CONFIDENCE: f64 = 0.80;

/// Per-request failures. Each maps to one HTTP status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid API Key")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Model is not ready yet")]
    NotReady,

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl ServiceError {
    /// Short label used as the metrics outcome.
    #[cfg(feature = "metrics")]
    pub fn outcome(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::RateLimitExceeded => "rate_limited",
            ServiceError::NotReady => "not_ready",
            ServiceError::Inference(_) => "inference_error",
        }
    }
}

/// Response body of `/predict/steel-rebar-price`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction_date: NaiveDate,
    pub predicted_price_usd_per_ton: f64,
    pub currency: &'static str,
    pub unit: &'static str,
    pub model_confidence: f64,
    #[serde(rename = "timestamp")]
    pub issued_at: DateTime<Utc>,
}

impl PredictionResult {
    /// Forecast for the business day after `issued_at`, price rounded to cents.
    pub fn new(value: f64, issued_at: DateTime<Utc>) -> Self {
        Self {
            prediction_date: calendar::next_business_day(issued_at.date_naive()),
            predicted_price_usd_per_ton: (value * 100.0).round() / 100.0,
            currency: CURRENCY,
            unit: UNIT,
            model_confidence: MODEL_CONFIDENCE,
            issued_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_result_rounds_and_skips_weekend() {
        // Friday
        let issued_at = Utc.with_ymd_and_hms(2025, 9, 26, 15, 30, 0).unwrap();
        let result = PredictionResult::new(749.456, issued_at);

        assert_eq!(result.prediction_date, NaiveDate::from_ymd_opt(2025, 9, 29).unwrap());
        assert_eq!(result.predicted_price_usd_per_ton, 749.46);
        assert_eq!(result.issued_at, issued_at);
    }

    #[test]
    fn test_result_json_shape() {
        let issued_at = Utc.with_ymd_and_hms(2025, 9, 24, 8, 0, 0).unwrap();
        let json = serde_json::to_value(PredictionResult::new(750.0, issued_at)).unwrap();

        assert_eq!(json["prediction_date"], "2025-09-25");
        assert_eq!(json["predicted_price_usd_per_ton"], 750.0);
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["unit"], "metric ton");
        assert_eq!(json["model_confidence"], 0.8);
        assert_eq!(json["timestamp"], "2025-09-24T08:00:00Z");
    }
}
