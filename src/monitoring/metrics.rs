//! Prometheus counters for the prediction endpoint.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub const OUTCOMES: [&str; 5] = ["ok", "unauthorized", "rate_limited", "not_ready", "inference_error"];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    inference_runs: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("rebar_forecast_requests_total", "Prediction requests by outcome"),
            &["outcome"],
        )?;
        let inference_runs = IntCounter::new(
            "rebar_forecast_inference_runs_total",
            "Forecasts computed on a cache miss",
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(inference_runs.clone()))?;

        // pre-create every label so the series exist from the start
        for outcome in OUTCOMES {
            requests.with_label_values(&[outcome]);
        }

        Ok(Self {
            registry,
            requests,
            inference_runs,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_inference(&self) {
        self.inference_runs.inc();
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
