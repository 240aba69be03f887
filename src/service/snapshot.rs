use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{Config, DataConfig, ModelConfig, PipelineConfig, SourceConfig};
use crate::data::source::{self, CsvFileSource, HttpCsvSource, JoinedSource, MarketDataSource};
use crate::data::types::{DateRange, TimeSeriesFrame};
use crate::model::trainer;
use crate::model::TrainedModel;
use crate::pipeline::{self, PipelineError, PreparedData, TARGET_COLUMN};
use crate::service::PredictionService;

/// Everything a forecast needs: the fitted model and the newest feature row.
#[derive(Debug)]
pub struct ForecastSnapshot {
    pub model: TrainedModel,
    pub live_features: Vec<f64>,
    pub live_row_date: NaiveDate,
    pub trained_at: DateTime<Utc>,
    /// Columns the pipeline filters removed from this training run.
    pub dropped_columns: Vec<String>,
}

impl ForecastSnapshot {
    /// Takes the last live row as the inference input.
    pub fn assemble(
        prepared: &PreparedData,
        model: TrainedModel,
        trained_at: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        let last = prepared
            .live
            .len()
            .checked_sub(1)
            .ok_or_else(|| PipelineError::InputData("live dataset is empty".to_string()))?;
        let live_features = model
            .feature_vector(&prepared.live, last)
            .map_err(|e| PipelineError::InputData(format!("live row: {}", e)))?;

        Ok(Self {
            live_row_date: prepared.live.dates()[last],
            live_features,
            model,
            trained_at,
            dropped_columns: prepared.dropped_columns(),
        })
    }
}

/// One source per config entry, outer-joined when there are several.
pub fn source_from_config(data: &DataConfig) -> Box<dyn MarketDataSource> {
    let mut sources: Vec<Box<dyn MarketDataSource>> = data
        .sources
        .iter()
        .map(|s| -> Box<dyn MarketDataSource> {
            match s {
                SourceConfig::File { path } => Box::new(CsvFileSource::new(path)),
                SourceConfig::Http { url } => Box::new(HttpCsvSource::new(url.clone())),
            }
        })
        .collect();

    if sources.len() == 1 {
        sources.remove(0)
    } else {
        Box::new(JoinedSource::new(sources))
    }
}

/// Pipeline and training on an already loaded dataset.
pub fn prepare_snapshot(
    raw: TimeSeriesFrame,
    pipeline_config: &PipelineConfig,
    model_config: &ModelConfig,
    now: DateTime<Utc>,
) -> Result<ForecastSnapshot, PipelineError> {
    let prepared = pipeline::run(raw, pipeline_config)?;
    let features = trainer::feature_columns(&prepared.training);
    let model = trainer::fit(&prepared.training, &features, TARGET_COLUMN, model_config)?;
    ForecastSnapshot::assemble(&prepared, model, now)
}

/// Ingestion, pipeline and training. CPU-bound stages run off the runtime.
pub async fn build_snapshot(
    config: &Config,
    source: &dyn MarketDataSource,
    now: DateTime<Utc>,
) -> Result<ForecastSnapshot, PipelineError> {
    let range = DateRange::new(config.data.start_date, now.date_naive());
    info!("📊 Loading market data from {} ({} to {})", source.describe(), range.start, range.end);
    let raw = source::load_dataset(source, range).await?;

    let pipeline_config = config.pipeline.clone();
    let model_config = config.model.clone();
    let snapshot = tokio::task::spawn_blocking(move || {
        prepare_snapshot(raw, &pipeline_config, &model_config, now)
    })
    .await
    .map_err(|e| PipelineError::InputData(format!("training task failed: {}", e)))??;

    info!(
        live_row_date = %snapshot.live_row_date,
        training_rows = snapshot.model.training_rows(),
        features = snapshot.model.feature_columns().len(),
        dropped = ?snapshot.dropped_columns,
        "✅ Forecast snapshot ready"
    );
    Ok(snapshot)
}

/// Rebuilds the snapshot once. On failure the previous one stays in place.
pub async fn refresh_once(
    service: &PredictionService,
    config: &Config,
    source: &dyn MarketDataSource,
) -> Result<(), PipelineError> {
    let now = service.now();
    match build_snapshot(config, source, now).await {
        Ok(snapshot) => {
            service.install_snapshot(snapshot).await;
            Ok(())
        }
        Err(e) => {
            error!("❌ Model refresh failed, keeping previous snapshot: {}", e);
            Err(e)
        }
    }
}

/// Periodic retraining, or `None` when `refresh_interval_hours` is 0.
pub fn spawn_refresh(
    service: Arc<PredictionService>,
    config: Arc<Config>,
    source: Arc<dyn MarketDataSource>,
) -> Option<JoinHandle<()>> {
    let hours = config.pipeline.refresh_interval_hours;
    if hours == 0 {
        return None;
    }

    info!("🔄 Model refresh every {}h", hours);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(hours * 3600));
        // first tick completes immediately; startup already trained
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = refresh_once(&service, &config, source.as_ref()).await {
                debug!(error = %e, "Refresh attempt failed, retrying next interval");
            }
        }
    }))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::raw_market_frame;
    use crate::service::clock::Clock;
    use crate::service::prediction::fixtures::{ready_service, start, API_KEY};
    use chrono::TimeZone;
    use std::io::Write;

    fn write_csv(frame: &TimeSeriesFrame, path: &std::path::Path) {
        let mut file = std::fs::File::create(path).unwrap();
        let names = frame.column_names();
        writeln!(file, "date,{}", names.join(",")).unwrap();
        for (row, date) in frame.dates().iter().enumerate() {
            let cells: Vec<String> = frame
                .columns()
                .iter()
                .map(|c| c.values[row].as_ref().map(|v| v.to_string()).unwrap_or_default())
                .collect();
            writeln!(file, "{},{}", date, cells.join(",")).unwrap();
        }
    }

    fn config_for(path: &std::path::Path) -> Config {
        Config::parse(&format!(
            r#"
            [data]
            start_date = "2024-01-01"
            sources = [{{ kind = "file", path = "{}" }}]

            [model]
            n_estimators = 15
            "#,
            path.display()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_snapshot_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.csv");
        let raw = raw_market_frame(50);
        write_csv(&raw, &path);

        let config = config_for(&path);
        let source = source_from_config(&config.data);
        let now = Utc.with_ymd_and_hms(2025, 9, 24, 9, 0, 0).unwrap();

        let snapshot = build_snapshot(&config, source.as_ref(), now).await.unwrap();
        assert_eq!(snapshot.trained_at, now);
        assert_eq!(snapshot.live_row_date, raw.dates()[49]);
        assert_eq!(snapshot.model.training_rows(), 49);
        assert_eq!(snapshot.live_features.len(), snapshot.model.feature_columns().len());
        assert_eq!(snapshot.dropped_columns, vec!["num_vix".to_string()]);
        assert!(snapshot.model.predict(&snapshot.live_features).unwrap().is_finite());
    }

    #[tokio::test]
    async fn test_build_snapshot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir.path().join("absent.csv"));
        let source = source_from_config(&config.data);
        let now = Utc.with_ymd_and_hms(2025, 9, 24, 9, 0, 0).unwrap();

        let result = build_snapshot(&config, source.as_ref(), now).await;
        assert!(matches!(result, Err(PipelineError::InputData(_))));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_snapshot() {
        let (service, _, _) = ready_service().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir.path().join("absent.csv"));
        let source = source_from_config(&config.data);

        assert!(refresh_once(&service, &config, source.as_ref()).await.is_err());
        assert_eq!(service.last_model_update().await, Some(start()));
    }

    #[tokio::test]
    async fn test_refresh_installs_new_snapshot() {
        let (service, clock, _) = ready_service().await;
        service.predict(Some(API_KEY)).await.unwrap();
        assert!(service.cache().peek().await.is_some());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.csv");
        write_csv(&raw_market_frame(45), &path);
        let config = config_for(&path);
        let source = source_from_config(&config.data);

        clock.advance(chrono::Duration::hours(24));
        refresh_once(&service, &config, source.as_ref()).await.unwrap();

        assert_eq!(service.last_model_update().await, Some(clock.now()));
        assert!(service.cache().peek().await.is_none());
        let snapshot = service.current_snapshot().await.unwrap();
        assert_eq!(snapshot.model.training_rows(), 44);
    }

    #[test]
    fn test_source_from_config_joins_multiple() {
        let config = Config::parse(
            r#"
            [data]
            sources = [
                { kind = "file", path = "a.csv" },
                { kind = "http", url = "https://example.com/b.csv" },
            ]
            "#,
        )
        .unwrap();
        let source = source_from_config(&config.data);
        assert_eq!(source.describe(), "file:a.csv + http:https://example.com/b.csv");
    }
}
