pub mod backend;
pub mod health;
pub mod jobs;
pub mod queue;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws?user_id=N                 WebSocket notifications
///
/// /jobs/render                  submit a render (POST)
/// /jobs/upscale                 submit an upscale (POST)
/// /jobs/cancel                  cancel the head job (POST)
/// /jobs/input                   source image for a waiting upscale (POST, multipart)
///
/// /queue                        queue snapshot
///
/// /backend/models               WebUI catalogues
/// /backend/samplers
/// /backend/upscalers
/// /backend/embeddings
/// /backend/loras
/// /backend/vaes
/// /backend/smi                  GPU status report
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/queue", queue::router())
        .nest("/backend", backend::router())
}
