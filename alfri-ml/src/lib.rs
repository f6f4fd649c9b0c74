//! alfri-ml library interface
//!
//! Model registry, inference engines, prediction and clustering services and
//! the HTTP router. `main.rs` only wires configuration and startup.

pub mod api;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod registry;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use alfri_common::db::SubjectSource;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{LegacyOffsets, ServiceConfig, StudyProgram};
use crate::registry::ModelRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Installed once the background load finishes
    pub registry: Arc<RwLock<Option<Arc<ModelRegistry>>>>,
    /// True when every configured model loaded
    pub models_ready: Arc<AtomicBool>,
    /// Subject/focus-vector source for the clustering endpoints
    pub subjects: Option<Arc<dyn SubjectSource>>,
    pub study_programs: Arc<Vec<StudyProgram>>,
    pub legacy_offsets: LegacyOffsets,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &ServiceConfig, subjects: Option<Arc<dyn SubjectSource>>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(None)),
            models_ready: Arc::new(AtomicBool::new(false)),
            subjects,
            study_programs: Arc::new(config.study_programs.clone()),
            legacy_offsets: config.legacy_offsets,
            startup_time: Utc::now(),
        }
    }

    /// State with an already loaded registry
    pub async fn with_registry(
        config: &ServiceConfig,
        subjects: Option<Arc<dyn SubjectSource>>,
        registry: ModelRegistry,
    ) -> Self {
        let state = Self::new(config, subjects);
        state.install_registry(registry).await;
        state
    }

    /// Publish a loaded registry and its readiness
    pub async fn install_registry(&self, registry: ModelRegistry) {
        let ready = registry.is_ready();
        *self.registry.write().await = Some(Arc::new(registry));
        self.models_ready.store(ready, Ordering::SeqCst);
    }

    /// Loaded registry, or 503 while loading is still in progress
    pub async fn registry(&self) -> ApiResult<Arc<ModelRegistry>> {
        self.registry
            .read()
            .await
            .clone()
            .ok_or_else(|| ApiError::ModelNotLoaded("Models are still loading".to_string()))
    }

    pub fn is_ready(&self) -> bool {
        self.models_ready.load(Ordering::SeqCst)
    }

    pub fn subject_source(&self) -> ApiResult<Arc<dyn SubjectSource>> {
        self.subjects.clone().ok_or_else(|| {
            ApiError::ServiceUnavailable("Subject data source is not configured".to_string())
        })
    }

    pub fn study_program(&self, id: i64) -> Option<&StudyProgram> {
        self.study_programs.iter().find(|p| p.id == id)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::prediction_routes())
        .merge(api::clustering_routes())
        .merge(api::model_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for browser clients
        .layer(CorsLayer::permissive())
}
