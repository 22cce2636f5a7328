use axum::routing::post;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST /render   -> submit_render
/// POST /upscale  -> submit_upscale
/// POST /cancel   -> cancel
/// POST /input    -> deliver_input
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/render", post(jobs::submit_render))
        .route("/upscale", post(jobs::submit_upscale))
        .route("/cancel", post(jobs::cancel))
        .route("/input", post(jobs::deliver_input))
}
