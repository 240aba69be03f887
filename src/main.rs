mod config;
mod data;
mod model;
mod monitoring;
mod pipeline;
mod server;
mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::{Config, EnvConfig};
use data::source::MarketDataSource;
use monitoring::PredictionLedger;
use service::clock::SystemClock;
use service::snapshot;
use service::PredictionService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("🚀 Steel rebar price forecaster starting...");

    // Load configuration
    let env_config = EnvConfig::load()?;
    tracing::info!("Loading configuration from {}", env_config.config_path);
    let config = Arc::new(Config::load(&env_config.config_path)?);

    tracing::info!(
        "Limits: {} requests / {}s per key, cache TTL {}s",
        config.limits.rate_limit_requests,
        config.limits.rate_limit_window_secs,
        config.limits.cache_ttl_secs
    );

    let mut prediction_service =
        PredictionService::from_limits(env_config.api_key.clone(), &config.limits, Arc::new(SystemClock));

    if config.monitoring.csv_logging {
        tracing::info!("CSV prediction ledger: {}", config.monitoring.csv_log_path);
        prediction_service = prediction_service.with_ledger(PredictionLedger::new(&config.monitoring.csv_log_path)?);
    }

    #[cfg(feature = "metrics")]
    {
        let metrics = monitoring::metrics::Metrics::new().context("Failed to register metrics")?;
        prediction_service = prediction_service.with_metrics(metrics);
    }

    let prediction_service = Arc::new(prediction_service);
    let source: Arc<dyn MarketDataSource> = Arc::from(snapshot::source_from_config(&config.data));

    // Train before accepting traffic
    let initial = snapshot::build_snapshot(&config, source.as_ref(), prediction_service.now())
        .await
        .context("Initial training failed")?;
    prediction_service.install_snapshot(initial).await;

    let _refresh = snapshot::spawn_refresh(prediction_service.clone(), config.clone(), source);

    tracing::info!("✅ Forecaster initialized successfully");
    server::run_server(prediction_service, &config.server).await
}
