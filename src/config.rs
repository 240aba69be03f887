use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    pub sources: Vec<SourceConfig>,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default()
}

/// One upstream dataset. Its columns are outer-joined with the others on date.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    File { path: String },
    Http { url: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema: SchemaConfig,
    pub completeness_threshold: f64,
    pub degenerate_threshold: f64,
    pub degenerate_exceptions: Vec<String>,
    pub drivers: Vec<String>,
    pub target: String,
    pub lags: Vec<usize>,
    /// 0 disables periodic retraining.
    pub refresh_interval_hours: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: SchemaConfig::default(),
            completeness_threshold: 80.0,
            degenerate_threshold: 0.9,
            degenerate_exceptions: vec!["cat_property_type".to_string()],
            drivers: [
                "num_aluminum_price",
                "num_crude_oil_price",
                "num_copper_price",
                "num_hot_rolled_coil_price",
                "num_coking_coal_price",
                "num_iron_ore_price",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            target: "tgt_rebar_price".to_string(),
            lags: crate::pipeline::features::DEFAULT_LAGS.to_vec(),
            refresh_interval_hours: 0,
        }
    }
}

/// Raw column names per category, renamed to `{prefix}{name}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub identifier: Vec<String>,
    pub date: Vec<String>,
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
    pub text: Vec<String>,
    pub geo: Vec<String>,
    pub target: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            identifier: Vec::new(),
            date: Vec::new(),
            numeric: [
                "aluminum_price",
                "crude_oil_price",
                "dollar_index",
                "copper_price",
                "hot_rolled_coil_price",
                "coking_coal_price",
                "iron_ore_price",
                "usd_cny",
                "sp500",
                "vix",
                "usd_mxn",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            categorical: Vec::new(),
            text: Vec::new(),
            geo: Vec::new(),
            target: vec!["rebar_price".to_string()],
        }
    }
}

/// Boosted-tree hyperparameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 4,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: usize,
    #[serde(default = "default_one_hour_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_one_hour_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_one_hour_secs(),
            cache_ttl_secs: default_one_hour_secs(),
            inference_timeout_ms: default_inference_timeout_ms(),
        }
    }
}

fn default_rate_limit_requests() -> usize { 100 }
fn default_one_hour_secs() -> u64 { 3600 }
fn default_inference_timeout_ms() -> u64 { 5000 }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
}

fn default_csv_log_path() -> String { "predictions.csv".to_string() }

/// Secrets and overrides read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_key: String,
    pub config_path: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.data.sources.is_empty() {
            anyhow::bail!("[data] needs at least one source");
        }
        // a zero lag would copy the target's own day into the features
        if config.pipeline.lags.contains(&0) {
            anyhow::bail!("[pipeline] lags must be positive");
        }
        Ok(config)
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_key = std::env::var("PREDICTOR_API_KEY")
            .context("PREDICTOR_API_KEY not set")?;
        if api_key.is_empty() {
            anyhow::bail!("PREDICTOR_API_KEY is empty");
        }

        Ok(Self {
            api_key,
            config_path: std::env::var("PREDICTOR_CONFIG")
                .unwrap_or_else(|_| "config.toml".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [data]
            sources = [{ kind = "file", path = "data/rebar.csv" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.data.start_date, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!(
            config.data.sources,
            vec![SourceConfig::File { path: "data/rebar.csv".to_string() }]
        );
        assert_eq!(config.pipeline.completeness_threshold, 80.0);
        assert_eq!(config.pipeline.lags, vec![1, 3, 5, 7]);
        assert_eq!(config.model, ModelConfig::default());
        assert_eq!(config.limits.rate_limit_requests, 100);
        assert_eq!(config.limits.cache_ttl_secs, 3600);
        assert!(!config.monitoring.csv_logging);
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [data]
            start_date = "2020-01-01"
            sources = [
                { kind = "file", path = "data/rebar.csv" },
                { kind = "http", url = "https://example.com/drivers.csv" },
            ]

            [pipeline]
            completeness_threshold = 70.0
            refresh_interval_hours = 24

            [pipeline.schema]
            numeric = ["copper_price"]
            target = ["rebar_price"]

            [model]
            n_estimators = 10

            [limits]
            rate_limit_requests = 5

            [monitoring]
            csv_logging = true
            csv_log_path = "/tmp/predictions.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.data.sources.len(), 2);
        assert_eq!(config.pipeline.completeness_threshold, 70.0);
        assert_eq!(config.pipeline.degenerate_threshold, 0.9);
        assert_eq!(config.pipeline.schema.numeric, vec!["copper_price".to_string()]);
        assert_eq!(config.model.n_estimators, 10);
        assert_eq!(config.model.max_depth, 4);
        assert_eq!(config.limits.rate_limit_requests, 5);
        assert_eq!(config.limits.rate_limit_window_secs, 3600);
        assert!(config.monitoring.csv_logging);
    }

    #[test]
    fn test_config_without_sources_is_rejected() {
        assert!(Config::parse("[data]\nsources = []\n").is_err());
    }

    #[test]
    fn test_zero_lag_is_rejected() {
        let contents = r#"
            [data]
            sources = [{ kind = "file", path = "a.csv" }]

            [pipeline]
            lags = [1, 0, 5]
        "#;
        let err = Config::parse(contents).unwrap_err();
        assert!(err.to_string().contains("lags must be positive"));
    }
}
