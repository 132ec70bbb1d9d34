//! WebSocket handler for the realtime gateway.
//!
//! Each connection is served by its own task. Inbound messages are handled
//! one at a time and statelessly: `ping` answers `pong`, `sync_request`
//! answers `sync_response` with the device's delta, anything else is
//! rejected without a response.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::connectivity::ConnectivityStatus;
use super::delta::Delta;
use crate::error::{AppError, Result};
use crate::websocket::{InboundMessage, OutboundMessage};
use crate::{now_millis, AppState};

/// Identity a connection was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub device_id: String,
}

/// Response to one inbound message.
#[derive(Debug)]
pub struct Reply {
    pub message: OutboundMessage,
    /// Delta to acknowledge once `message` has been handed to the connection
    pub delivered: Option<Delta>,
}

impl Reply {
    fn message(message: OutboundMessage) -> Self {
        Self {
            message,
            delivered: None,
        }
    }
}

/// Handle an established WebSocket connection.
///
/// This function:
/// 1. Registers the connection and marks the user online
/// 2. Starts a background replay of the user's offline queue
/// 3. Forwards outgoing messages from a channel to the socket
/// 4. Processes incoming messages until the socket closes
pub async fn handle_websocket_connection(socket: WebSocket, state: AppState, session: Session) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();

    let conn_manager = state.conn_manager.clone();
    let conn_id = conn_manager.register(&session.user_id, &session.device_id, tx);

    tracing::info!(
        conn_id = %conn_id,
        user_id = %session.user_id,
        device_id = %session.device_id,
        "WebSocket client connected"
    );

    if let Err(e) = state
        .connectivity
        .set_status(&session.user_id, ConnectivityStatus::Online)
        .await
    {
        tracing::warn!(user_id = %session.user_id, error = %e, "Failed to mark user online");
    }

    let replay_state = state.clone();
    let replay_user = session.user_id.clone();
    tokio::spawn(async move {
        match replay_state.connectivity.sync_when_online(&replay_user).await {
            Ok(report) if report.total() > 0 => {
                tracing::info!(user_id = %replay_user, replayed = report.total(), "Replayed offline changes on connect");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id = %replay_user, error = %e, "Offline replay on connect failed");
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match process_message(&text, &session, &state).await {
                Ok(reply) => {
                    let sent = conn_manager.send_to(&conn_id, reply.message);
                    if let (true, Some(delta)) = (sent, reply.delivered) {
                        if let Err(e) = state.delta.acknowledge(&delta).await {
                            tracing::warn!(conn_id = %conn_id, error = %e, "Failed to acknowledge delta");
                        }
                    }
                }
                Err(AppError::UnknownMessageType(kind)) => {
                    tracing::warn!(conn_id = %conn_id, message_type = %kind, "Unknown message type");
                }
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "Failed to process message");
                    conn_manager.send_to(
                        &conn_id,
                        OutboundMessage::error(&session.user_id, &session.device_id, e.to_string()),
                    );
                }
            },
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        user_id = %session.user_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Handle one inbound text frame.
///
/// The connection's session identity is authoritative; ids carried in the
/// envelope are only checked. Unknown types fail with `UnknownMessageType`.
pub async fn process_message(text: &str, session: &Session, state: &AppState) -> Result<Reply> {
    let msg: InboundMessage = serde_json::from_str(text)?;

    if msg
        .user_id
        .as_deref()
        .is_some_and(|user_id| user_id != session.user_id)
    {
        tracing::warn!(
            expected = %session.user_id,
            received = ?msg.user_id,
            "User ID mismatch in message"
        );
    }

    match msg.kind.as_str() {
        "ping" => Ok(Reply::message(OutboundMessage::pong(
            &session.user_id,
            &session.device_id,
        ))),
        "sync_request" => {
            let deadline = state.config.sync_deadline;
            let delta = tokio::time::timeout(
                deadline,
                state.delta.get_delta_sync(
                    &session.user_id,
                    &session.device_id,
                    msg.last_sync_time(),
                    now_millis(),
                ),
            )
            .await
            .map_err(|_| AppError::Timeout(format!("sync request exceeded {:?}", deadline)))??;

            let message = OutboundMessage::sync_response(
                &session.user_id,
                &session.device_id,
                &delta.events,
            )?;
            Ok(Reply {
                message,
                delivered: Some(delta),
            })
        }
        _ => Err(AppError::UnknownMessageType(msg.kind)),
    }
}
