use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use renderq_core::error::CoreError;
use renderq_core::types::{DbId, Origin};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;
use crate::ws::manager::WsManager;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Requester whose notifications the connection receives.
    pub user_id: DbId,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// Only users allowed to submit requests may listen. After the upgrade the
/// connection is registered with `WsManager` and managed by a spawned
/// sender task plus the receive loop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if !state.config.access.allows(&Origin::direct(params.user_id)) {
        return Err(AppError::Core(CoreError::Forbidden(
            "User is not allowed".into(),
        )));
    }
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, params.user_id, state.ws_manager))
        .into_response())
}

/// Manage a single WebSocket connection after upgrade.
///
/// The connection is push-only: inbound frames other than Close are
/// ignored. Requests go through the HTTP endpoints.
async fn handle_socket(socket: WebSocket, user_id: DbId, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), user_id).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
