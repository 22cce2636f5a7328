use std::sync::Arc;

use renderq_backend::sdapi::SdApi;
use renderq_queue::RenderQueue;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (notification clients).
    pub ws_manager: Arc<WsManager>,
    /// The single render queue.
    pub queue: Arc<RenderQueue>,
    /// WebUI client, for listings and health.
    pub sd_api: Arc<SdApi>,
}
