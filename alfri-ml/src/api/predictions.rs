//! Prediction endpoints
//!
//! Inference is CPU-bound and may wait on the shared inference lock, so both
//! handlers run the predictor on a blocking task.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::models::{PassingChanceResponse, PassingMarkResponse};
use crate::services::{PassingChancePredictor, PassingMarkPredictor};
use crate::{ApiError, ApiResult, AppState};

/// JSON body, any rejection becoming a 400 validation error
fn parse_body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation {
            message: "Invalid JSON payload".to_string(),
            details: Some(json!({"reason": rejection.body_text()})),
        })
}

/// POST /api/v1/predictions/passing-chance
///
/// Body: `{"subjects": {"<subject>": [features...]}}`. Per-subject failures
/// are reported inside `results`; the request itself only fails on a
/// malformed body or while models are loading.
pub async fn passing_chance(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<PassingChanceResponse>> {
    let body = parse_body(payload)?;
    let subjects = match body.get("subjects") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(ApiError::validation(
                "subjects must be an object mapping subject to features",
            ))
        }
        None => return Err(ApiError::validation("Missing required field: subjects")),
    };

    let registry = state.registry().await?;
    debug!("Passing-chance request for {} subject(s)", subjects.len());

    let results = tokio::task::spawn_blocking(move || {
        PassingChancePredictor::new(&registry).predict_batch(&subjects)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))?;

    Ok(Json(PassingChanceResponse { results }))
}

/// POST /api/v1/predictions/passing-mark
///
/// Body: `{"subject": "<subject>", "features": [...]}`
pub async fn passing_mark(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<PassingMarkResponse>> {
    let body = parse_body(payload)?;
    if !body.is_object() {
        return Err(ApiError::validation("Invalid payload: expected JSON object"));
    }

    let registry = state.registry().await?;

    let response = tokio::task::spawn_blocking(move || {
        PassingMarkPredictor::new(&registry).predict(body.get("subject"), body.get("features"))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))??;

    Ok(Json(response))
}

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/predictions/passing-chance", post(passing_chance))
        .route("/api/v1/predictions/passing-mark", post(passing_mark))
}
