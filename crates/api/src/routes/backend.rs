use axum::routing::get;
use axum::Router;

use crate::handlers::backend;
use crate::state::AppState;

/// Routes mounted at `/backend`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(backend::list_models))
        .route("/samplers", get(backend::list_samplers))
        .route("/upscalers", get(backend::list_upscalers))
        .route("/embeddings", get(backend::list_embeddings))
        .route("/loras", get(backend::list_loras))
        .route("/vaes", get(backend::list_vaes))
        .route("/smi", get(backend::gpu_status))
}
