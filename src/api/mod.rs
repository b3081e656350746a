use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{delete, post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::*;
use crate::remote::Row;
use crate::state::AppState;

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    status: StatusFilter,
}

#[derive(Deserialize)]
struct ClearParams {
    #[serde(default)]
    confirm: bool,
}

#[derive(Deserialize)]
struct RemoteParams {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct ConnectivityRequest {
    online: bool,
}

#[derive(Serialize)]
struct SyncStatusResponse {
    online: bool,
    sync_in_progress: bool,
    pending: usize,
    queue: QueueStats,
}

#[derive(Serialize)]
struct RemoteSummaryResponse {
    kind: RecordKind,
    total: u64,
    recent: Vec<Row>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registrations", get(list_registrations).post(create_registration))
        .route("/screenings", get(list_screenings).post(create_screening))
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        .route("/queue", delete(clear_queue))
        .route("/connectivity", put(set_connectivity))
        .route("/remote/{kind}", get(remote_summary))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_records(
    state: &AppState,
    kind: RecordKind,
    filter: StatusFilter,
) -> Result<Vec<QueuedRecord>, AppError> {
    match filter {
        StatusFilter::All => state.queue.list_all(kind).await,
        StatusFilter::Pending => state.queue.list_unsynced(kind).await,
        StatusFilter::Synced => state.queue.list_synced(kind).await,
    }
}

async fn list_registrations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<QueuedRecord>>, AppError> {
    let records = list_records(&state, RecordKind::Registration, params.status).await?;
    Ok(Json(records))
}

async fn list_screenings(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<QueuedRecord>>, AppError> {
    let records = list_records(&state, RecordKind::Screening, params.status).await?;
    Ok(Json(records))
}

/// Remote writes run on their own task so a client that goes away mid-request
/// cannot cancel them halfway.
async fn submit(
    state: AppState,
    kind: RecordKind,
    payload: Map<String, Value>,
) -> Result<(StatusCode, Json<QueuedRecord>), AppError> {
    let sync = state.sync.clone();
    let record = tokio::spawn(async move { sync.submit(kind, payload).await })
        .await
        .map_err(|e| AppError::Internal(format!("submission task failed: {}", e)))??;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn create_registration(
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<QueuedRecord>), AppError> {
    submit(state, RecordKind::Registration, payload).await
}

async fn create_screening(
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<QueuedRecord>), AppError> {
    submit(state, RecordKind::Screening, payload).await
}

async fn sync_now(State(state): State<AppState>) -> Result<Json<SyncOutcome>, AppError> {
    let sync = state.sync.clone();
    let outcome = tokio::spawn(async move { sync.sync_all().await })
        .await
        .map_err(|e| AppError::Internal(format!("sync task failed: {}", e)))??;
    Ok(Json(outcome))
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatusResponse>, AppError> {
    let queue = state.queue.stats().await?;
    Ok(Json(SyncStatusResponse {
        online: state.connectivity.is_online(),
        sync_in_progress: state.sync.is_running(),
        pending: queue.pending(),
        queue,
    }))
}

async fn clear_queue(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<StatusCode, AppError> {
    if !params.confirm {
        return Err(AppError::BadRequest(
            "clearing the offline queue is irreversible; pass confirm=true".to_string(),
        ));
    }
    state.queue.clear_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_connectivity(
    State(state): State<AppState>,
    Json(req): Json<ConnectivityRequest>,
) -> StatusCode {
    state.connectivity.set_online(req.online);
    StatusCode::NO_CONTENT
}

async fn remote_summary(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<RemoteParams>,
) -> Result<Json<RemoteSummaryResponse>, AppError> {
    let kind = kind.parse::<RecordKind>().map_err(|_| AppError::NotFound)?;
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let (total, recent) = state.sync.remote_summary(kind, limit).await?;
    Ok(Json(RemoteSummaryResponse { kind, total, recent }))
}
