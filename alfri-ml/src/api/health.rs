//! Health, liveness and readiness endpoints

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when every configured model loaded, otherwise "degraded"
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub models_loaded: usize,
    pub model_errors: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (models_loaded, model_errors) = match state.registry.read().await.as_ref() {
        Some(registry) => (registry.loaded_count(), registry.error_count()),
        None => (0, 0),
    };

    Json(HealthResponse {
        status: if state.is_ready() { "ok" } else { "degraded" }.to_string(),
        module: "alfri-ml".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        models_loaded,
        model_errors,
    })
}

/// GET /health/live
pub async fn liveness() -> Json<Value> {
    Json(json!({"status": "alive"}))
}

/// GET /health/ready
///
/// 200 only once every configured model is loaded.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.is_ready() {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not ready"})),
        )
    }
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}
