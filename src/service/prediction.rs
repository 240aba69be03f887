use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::LimitsConfig;
use crate::data::cache::PredictionCache;
use crate::monitoring::PredictionLedger;
use crate::service::auth::Authenticator;
use crate::service::clock::Clock;
use crate::service::rate_limit::RateLimiter;
use crate::service::snapshot::ForecastSnapshot;
use crate::service::{PredictionResult, ServiceError};

#[cfg(feature = "metrics")]
use crate::monitoring::metrics::Metrics;

/// Request path for a forecast: authenticate, rate limit, then serve from
/// the cache or run inference on the current snapshot.
pub struct PredictionService {
    authenticator: Authenticator,
    limiter: RateLimiter,
    cache: PredictionCache<ServiceError>,
    snapshot: RwLock<Option<Arc<ForecastSnapshot>>>,
    clock: Arc<dyn Clock>,
    inference_timeout: Duration,
    ledger: Option<PredictionLedger>,
    #[cfg(feature = "metrics")]
    metrics: Option<Metrics>,
}

impl PredictionService {
    pub fn new(
        authenticator: Authenticator,
        limiter: RateLimiter,
        cache: PredictionCache<ServiceError>,
        clock: Arc<dyn Clock>,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            authenticator,
            limiter,
            cache,
            snapshot: RwLock::new(None),
            clock,
            inference_timeout,
            ledger: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    pub fn from_limits(api_key: impl Into<String>, limits: &LimitsConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Authenticator::new(api_key),
            RateLimiter::new(
                limits.rate_limit_requests,
                chrono::Duration::seconds(limits.rate_limit_window_secs as i64),
            ),
            PredictionCache::new(chrono::Duration::seconds(limits.cache_ttl_secs as i64)),
            clock,
            Duration::from_millis(limits.inference_timeout_ms),
        )
    }

    pub fn with_ledger(mut self, ledger: PredictionLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Unused rate-limit budget of `api_key` right now.
    pub fn rate_limit_remaining(&self, api_key: &str) -> usize {
        self.limiter.remaining(api_key, self.clock.now())
    }

    #[cfg(test)]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[cfg(test)]
    pub fn cache(&self) -> &PredictionCache<ServiceError> {
        &self.cache
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    pub async fn current_snapshot(&self) -> Option<Arc<ForecastSnapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn last_model_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.as_ref().map(|s| s.trained_at)
    }

    /// Swaps in a new snapshot. Forecasts from the old model are dropped.
    pub async fn install_snapshot(&self, snapshot: ForecastSnapshot) {
        let trained_at = snapshot.trained_at;
        *self.snapshot.write().await = Some(Arc::new(snapshot));
        self.cache.invalidate().await;
        let purged = self.limiter.purge_idle(self.clock.now());
        info!(%trained_at, purged_keys = purged, "Snapshot installed");
    }

    pub async fn predict(&self, api_key: Option<&str>) -> Result<PredictionResult, ServiceError> {
        let result = self.serve(api_key).await;
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_request(result.as_ref().err().map_or("ok", ServiceError::outcome));
        }
        result
    }

    async fn serve(&self, api_key: Option<&str>) -> Result<PredictionResult, ServiceError> {
        if let Err(e) = self.authenticator.verify(api_key) {
            warn!("Rejected request with invalid API key");
            return Err(e);
        }
        let key = api_key.unwrap_or_default();

        let now = self.clock.now();
        self.limiter.admit(key, now)?;

        let (value, outcome) = self
            .cache
            .get_or_compute(now, || self.compute(now))
            .await?;

        debug!(?outcome, value, "Forecast served");
        Ok(PredictionResult::new(value, now))
    }

    async fn compute(&self, now: DateTime<Utc>) -> Result<f64, ServiceError> {
        let snapshot = self.current_snapshot().await.ok_or(ServiceError::NotReady)?;
        let value = self.infer(snapshot.clone()).await?;

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_inference();
        }

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record(now, snapshot.live_row_date, value) {
                warn!("Failed to write prediction ledger: {}", e);
            }
        }
        info!(
            live_row_date = %snapshot.live_row_date,
            value,
            "Forecast computed"
        );
        Ok(value)
    }

    async fn infer(&self, snapshot: Arc<ForecastSnapshot>) -> Result<f64, ServiceError> {
        let task = tokio::task::spawn_blocking(move || snapshot.model.predict(&snapshot.live_features));

        match tokio::time::timeout(self.inference_timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => {
                error!("Inference failed: {}", e);
                Err(ServiceError::Inference(e.to_string()))
            }
            Ok(Err(e)) => {
                error!("Inference task failed: {}", e);
                Err(ServiceError::Inference("inference task failed".to_string()))
            }
            Err(_) => {
                error!(timeout_ms = self.inference_timeout.as_millis() as u64, "Inference timed out");
                Err(ServiceError::Inference("inference timed out".to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::model::{ModelError, Regressor};
    use crate::service::clock::ManualClock;
    use crate::service::snapshot::fixtures::snapshot_with;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub const API_KEY: &str = "test-key";

    /// Returns `base + n` on its n-th call, so each recompute is visible.
    pub struct CountingRegressor {
        pub base: f64,
        pub calls: Arc<AtomicUsize>,
    }

    impl Regressor for CountingRegressor {
        fn fit(&mut self, _features: &[Vec<f64>], _targets: &[f64]) -> Result<(), ModelError> {
            Ok(())
        }

        fn predict(&self, _features: &[f64]) -> Result<f64, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.base + n as f64)
        }
    }

    pub fn start() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2025, 9, 24, 9, 0, 0).unwrap()
    }

    /// Ready service with default limits, a manual clock and a counting model.
    pub async fn ready_service() -> (Arc<PredictionService>, Arc<ManualClock>, Arc<AtomicUsize>) {
        let clock = Arc::new(ManualClock::new(start()));
        let calls = Arc::new(AtomicUsize::new(0));
        let service = PredictionService::from_limits(API_KEY, &LimitsConfig::default(), clock.clone());
        service
            .install_snapshot(snapshot_with(
                Box::new(CountingRegressor {
                    base: 750.0,
                    calls: calls.clone(),
                }),
                start(),
            ))
            .await;
        (Arc::new(service), clock, calls)
    }
}
