//! HTTP surface of the forecaster.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::service::{PredictionResult, PredictionService, ServiceError};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const PREDICT_PATH: &str = "/predict/steel-rebar-price";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

const SERVICE_NAME: &str = "Steel Rebar Price Predictor";
const SERVICE_VERSION: &str = "1.0";
const DOCUMENTATION_URL: &str = "https://github.com/adhro/Reto_DEACERO";
const DATA_SOURCES: [&str; 3] = ["Yahoo Finance", "World Bank Commodity Prices", "Trading Economics"];

type AppState = Arc<PredictionService>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ServiceError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServiceError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ServiceError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ServiceError::Inference(msg) => {
                error!(detail = %msg, "Prediction failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Prediction failed. Check server logs for details.".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn create_router(service: AppState) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(PREDICT_PATH, get(predict));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(metrics));

    router.layer(TraceLayer::new_for_http()).with_state(service)
}

async fn root(State(service): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "documentation_url": DOCUMENTATION_URL,
        "data_sources": DATA_SOURCES,
        "last_model_update": service.last_model_update().await,
    }))
}

async fn health(State(service): State<AppState>) -> Response {
    match service.current_snapshot().await {
        Some(snapshot) => Json(json!({
            "status": "ready",
            "last_model_update": snapshot.trained_at,
            "live_row_date": snapshot.live_row_date,
            "dropped_columns": snapshot.dropped_columns,
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
            .into_response(),
    }
}

async fn predict(State(service): State<AppState>, headers: HeaderMap) -> Response {
    let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let result: Result<PredictionResult, ServiceError> = service.predict(api_key).await;

    // Only authenticated callers have a budget to report.
    let remaining = match &result {
        Err(ServiceError::Unauthorized) => None,
        _ => Some(service.rate_limit_remaining(api_key.unwrap_or_default())),
    };

    let mut response = result.map(Json).into_response();
    if let Some(remaining) = remaining {
        response
            .headers_mut()
            .insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
    }
    response
}

#[cfg(feature = "metrics")]
async fn metrics(State(service): State<AppState>) -> Response {
    let Some(metrics) = service.metrics() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.render() {
        Ok(body) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Binds and serves until ctrl+c.
pub async fn run_server(service: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = create_router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 Listening on http://{}", addr);
    info!("   GET {}  (header: X-API-Key)", PREDICT_PATH);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
