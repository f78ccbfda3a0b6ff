use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::domain::ingest::{BatchSyncRequest, IngestionJobView, QueueStats};
use crate::routes::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/batch", post(start_batch_sync))
        .route("/configured", post(start_configured_sync))
        .route("/status", get(overall_status))
        .route("/status/:job_id", get(job_status))
        .route("/queue", delete(clear_queue))
}

#[instrument(name = "POST /api/sync/batch", skip(state, request), fields(folders = request.folders.len()))]
async fn start_batch_sync(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<BatchSyncRequest>,
) -> Json<IngestionJobView> {
    let job = state.ingestion.clone().start_batch_sync(request).await;
    Json(job.snapshot())
}

#[instrument(name = "POST /api/sync/configured", skip(state))]
async fn start_configured_sync(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<IngestionJobView> {
    let job = state.ingestion.clone().start_configured_sync().await;
    Json(job.snapshot())
}

#[derive(Serialize)]
struct OverallStatus {
    jobs: Vec<IngestionJobView>,
    queue: QueueStats,
}

#[instrument(name = "GET /api/sync/status", skip(state))]
async fn overall_status(State(state): State<AppState>, _user: AuthUser) -> Json<OverallStatus> {
    Json(OverallStatus {
        jobs: state.ingestion.registry().snapshot_all().await,
        queue: state.queue.stats(),
    })
}

#[instrument(name = "GET /api/sync/status/{job_id}", skip(state))]
async fn job_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<String>,
) -> Result<Json<IngestionJobView>, ApiError> {
    state
        .ingestion
        .registry()
        .get(&job_id)
        .await
        .map(|job| Json(job.snapshot()))
        .ok_or_else(|| ApiError::not_found(format!("Job '{}' not found", job_id)))
}

#[instrument(name = "DELETE /api/sync/queue", skip(state))]
async fn clear_queue(State(state): State<AppState>, _user: AuthUser) -> Json<Value> {
    state.queue.clear().await;
    Json(json!({ "status": "cleared" }))
}
