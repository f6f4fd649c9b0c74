//! Clustering and recommendation endpoints
//!
//! Payload validation failures on these endpoints are 422, not 400.

use alfri_common::FOCUS_DIMENSIONS;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{
    ClusterStatsResponse, ClusteredSubject, ProgramSubjectsResponse, RecommendationResponse,
    SimilarSubjectsResponse, SubjectListQuery,
};
use crate::registry::ModelRegistry;
use crate::services::clustering::{cluster_distribution, label_subjects, program_cluster_count};
use crate::services::{recommend, ClusteringError, DirectClustering, RecommendParams};
use crate::{ApiError, ApiResult, AppState};

fn parse_body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Unprocessable(format!("Invalid JSON payload: {}", rejection.body_text())))
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::Internal(format!("Clustering task failed: {}", e))
}

/// Fetch a program's subjects and label them with the program's model
async fn labeled_subjects(
    state: &AppState,
    registry: Arc<ModelRegistry>,
    study_program_id: i64,
) -> ApiResult<(Vec<ClusteredSubject>, usize)> {
    let source = state.subject_source()?;
    let subjects = source
        .subjects_with_focus(study_program_id)
        .await
        .map_err(ClusteringError::from)?;
    if subjects.is_empty() {
        return Err(ClusteringError::NoSubjects(study_program_id).into());
    }
    debug!(
        "Fetched {} subjects for study program {} from {}",
        subjects.len(),
        study_program_id,
        source.source_id()
    );

    let labeled = tokio::task::spawn_blocking(move || {
        let n_clusters = program_cluster_count(&registry, study_program_id)?;
        let labeled = label_subjects(&registry, study_program_id, subjects)?;
        Ok::<_, ClusteringError>((labeled, n_clusters))
    })
    .await
    .map_err(join_error)??;

    Ok(labeled)
}

/// Study program id for the GET endpoints (unknown program is 400)
fn known_program(state: &AppState, study_program_id: i64) -> ApiResult<()> {
    if state.study_program(study_program_id).is_some() {
        Ok(())
    } else {
        let known: Vec<String> = state.study_programs.iter().map(|p| p.id.to_string()).collect();
        Err(ApiError::validation(format!(
            "Unknown study program {}; expected one of {}",
            study_program_id,
            known.join(", ")
        )))
    }
}

/// POST /api/v1/clustering/similar-subjects
pub async fn similar_subjects(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<SimilarSubjectsResponse>> {
    let body = parse_body(payload)?;
    // Named programs cluster ad hoc and work before the registry is loaded
    let registry = state.registry.read().await.clone();
    let programs = state.study_programs.clone();
    let legacy_offsets = state.legacy_offsets;

    let response = tokio::task::spawn_blocking(move || {
        DirectClustering::new(registry.as_deref(), &programs, legacy_offsets)
            .cluster(&body, &mut rand::thread_rng())
    })
    .await
    .map_err(join_error)??;

    Ok(Json(response))
}

/// POST /api/v1/clustering/recommend
pub async fn recommend_subjects(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<RecommendationResponse>> {
    let body = parse_body(payload)?;
    let params = RecommendParams::from_payload(&body, &state.study_programs)?;
    let registry = state.registry().await?;

    let (labeled, _) = labeled_subjects(&state, registry, params.study_program_id).await?;
    let response = recommend(&labeled, &params)?;

    info!(
        "Recommended {} subject(s) for {} selected in program {} ({:?})",
        response.recommendations.len(),
        params.subject_ids.len(),
        params.study_program_id,
        params.method
    );
    Ok(Json(response))
}

/// GET /api/v1/clustering/subjects/{study_program_id}?cluster=N
pub async fn program_subjects(
    State(state): State<AppState>,
    Path(study_program_id): Path<i64>,
    Query(query): Query<SubjectListQuery>,
) -> ApiResult<Json<ProgramSubjectsResponse>> {
    known_program(&state, study_program_id)?;
    let registry = state.registry().await?;
    let (mut subjects, n_clusters) = labeled_subjects(&state, registry, study_program_id).await?;

    if let Some(cluster) = query.cluster {
        subjects.retain(|s| s.cluster_label == cluster);
    }

    Ok(Json(ProgramSubjectsResponse {
        study_program_id,
        n_subjects: subjects.len(),
        n_clusters,
        focus_dimensions: FOCUS_DIMENSIONS.to_vec(),
        subjects,
    }))
}

/// GET /api/v1/clustering/stats/{study_program_id}
pub async fn cluster_stats(
    State(state): State<AppState>,
    Path(study_program_id): Path<i64>,
) -> ApiResult<Json<ClusterStatsResponse>> {
    known_program(&state, study_program_id)?;
    let registry = state.registry().await?;
    let (subjects, n_clusters) = labeled_subjects(&state, registry, study_program_id).await?;

    Ok(Json(ClusterStatsResponse {
        study_program_id,
        n_subjects: subjects.len(),
        n_clusters,
        cluster_distribution: cluster_distribution(&subjects),
        focus_dimensions: FOCUS_DIMENSIONS.to_vec(),
    }))
}

pub fn clustering_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/clustering/similar-subjects", post(similar_subjects))
        .route("/api/v1/clustering/recommend", post(recommend_subjects))
        .route("/api/v1/clustering/subjects/:study_program_id", get(program_subjects))
        .route("/api/v1/clustering/stats/:study_program_id", get(cluster_stats))
}
