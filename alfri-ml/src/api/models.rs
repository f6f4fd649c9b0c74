//! Model load report endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::registry::RegistryReport;
use crate::{ApiResult, AppState};

/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> ApiResult<Json<RegistryReport>> {
    let registry = state.registry().await?;
    Ok(Json(registry.report()))
}

pub fn model_routes() -> Router<AppState> {
    Router::new().route("/api/v1/models", get(list_models))
}
