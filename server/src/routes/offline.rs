//! Offline queue and connectivity routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use marksync_engine::{CacheStats, NewOfflineChange, OfflineChange};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::handlers::{ConnectivityStatus, ReplayReport};
use crate::AppState;

/// Create offline routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/offline/changes",
            post(queue_change).get(list_changes).delete(clear_changes),
        )
        .route("/offline/sync", post(sync_offline))
        .route("/offline/stats", get(stats))
        .route("/offline/status", get(status))
        .route(
            "/offline/resources/{resource_id}",
            get(cached_resource).put(cache_resource),
        )
        .route("/connectivity", get(connectivity))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    pub user_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Only unapplied changes
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub user_id: String,
    pub status: ConnectivityStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectivityResponse {
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub removed: usize,
}

/// POST /offline/changes - Stage a change made while disconnected.
async fn queue_change(
    State(state): State<AppState>,
    Json(change): Json<NewOfflineChange>,
) -> Result<(StatusCode, Json<OfflineChange>)> {
    let queued = state.offline.queue_offline_change(change).await?;
    Ok((StatusCode::CREATED, Json(queued)))
}

/// GET /offline/changes - List staged changes in replay order.
async fn list_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<Vec<OfflineChange>>> {
    let changes = if query.pending {
        state
            .offline
            .pending_changes(&query.user_id, query.device_id.as_deref())
            .await?
    } else {
        let all = state.offline.list_changes(&query.user_id).await?;
        match query.device_id.as_deref() {
            Some(device_id) => all.into_iter().filter(|c| c.device_id == device_id).collect(),
            None => all,
        }
    };
    Ok(Json(changes))
}

/// DELETE /offline/changes - Drop a user's staged changes and stats.
async fn clear_changes(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ClearResponse>> {
    let removed = state.offline.clear(&query.user_id).await?;
    Ok(Json(ClearResponse { removed }))
}

/// POST /offline/sync - Replay the queue if connectivity allows.
async fn sync_offline(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<ReplayReport>> {
    let report = state.connectivity.sync_when_online(&request.user_id).await?;
    Ok(Json(report))
}

/// GET /offline/stats
async fn stats(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CacheStats>> {
    Ok(Json(state.offline.stats(&query.user_id).await?))
}

/// GET /offline/status
async fn status(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<StatusResponse>> {
    let status = state.connectivity.status(&query.user_id).await?;
    Ok(Json(StatusResponse {
        user_id: query.user_id,
        status,
    }))
}

/// GET /offline/resources/{resource_id} - 404 when not cached.
async fn cached_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>> {
    let snapshot = state
        .offline
        .cached_resource(&query.user_id, &resource_id)
        .await?;
    Ok(Json(snapshot))
}

/// PUT /offline/resources/{resource_id} - Cache a snapshot for offline reads.
async fn cache_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<UserQuery>,
    Json(snapshot): Json<Value>,
) -> Result<StatusCode> {
    state
        .offline
        .cache_resource(&query.user_id, &resource_id, &snapshot)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /connectivity - Run the reachability probe.
async fn connectivity(State(state): State<AppState>) -> Json<ConnectivityResponse> {
    Json(ConnectivityResponse {
        online: state.connectivity.check_connectivity().await,
    })
}
