//! Sync endpoint routes.

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use marksync_engine::{NewEvent, ResourceKind, SyncEvent, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::handlers::{handle_websocket_connection, Session};
use crate::{now_millis, AppState};

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/events", post(record_event))
        .route("/mutations/{kind}", post(apply_mutation))
        .route("/sync", get(delta_handler))
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    pub user_id: String,
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    pub user_id: String,
    pub device_id: String,
    /// Unix seconds; anything unparseable falls back to the lookback window
    #[serde(default)]
    pub last_sync_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeltaResponse {
    pub events: Vec<SyncEvent>,
    /// Watermark stored for the device, in milliseconds
    pub last_sync_time: Timestamp,
}

/// GET /ws?user_id=&device_id= - Open the realtime gateway.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Response {
    let session = Session {
        user_id: query.user_id,
        device_id: query.device_id,
    };
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state, session))
}

/// POST /events - Record an event applied elsewhere.
async fn record_event(
    State(state): State<AppState>,
    Json(event): Json<NewEvent>,
) -> Result<(StatusCode, Json<SyncEvent>)> {
    let stored = state.delta.create_sync_event(event).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /mutations/{kind} - Apply a mutation from a connected device.
async fn apply_mutation(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(event): Json<NewEvent>,
) -> Result<(StatusCode, Json<SyncEvent>)> {
    let kind: ResourceKind = kind.parse().map_err(AppError::BadRequest)?;
    let stored = state.delta.apply_mutation(kind, event).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /sync - Pull and acknowledge the device's delta.
async fn delta_handler(
    State(state): State<AppState>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<DeltaResponse>> {
    let last_sync = query
        .last_sync_time
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok());

    let delta = tokio::time::timeout(
        state.config.sync_deadline,
        state
            .delta
            .get_delta_sync(&query.user_id, &query.device_id, last_sync, now_millis()),
    )
    .await
    .map_err(|_| AppError::Timeout("sync request".into()))??;

    state.delta.acknowledge(&delta).await?;

    Ok(Json(DeltaResponse {
        last_sync_time: delta.state.last_sync_time,
        events: delta.events,
    }))
}
