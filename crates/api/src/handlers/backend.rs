//! Handlers exposing the WebUI's catalogues (models, samplers, ...) and
//! the GPU status report.

use axum::extract::State;
use axum::Json;
use renderq_backend::BackendError;
use tokio::process::Command;

use crate::error::{AppError, AppResult};
use crate::middleware::Requester;
use crate::response::DataResponse;
use crate::state::AppState;

type Listing = AppResult<Json<DataResponse<Vec<String>>>>;

fn listing(result: Result<Vec<String>, BackendError>) -> Listing {
    Ok(Json(DataResponse { data: result? }))
}

/// GET /api/v1/backend/models
pub async fn list_models(State(state): State<AppState>) -> Listing {
    listing(state.sd_api.models().await)
}

/// GET /api/v1/backend/samplers
pub async fn list_samplers(State(state): State<AppState>) -> Listing {
    listing(state.sd_api.samplers().await)
}

/// GET /api/v1/backend/upscalers
pub async fn list_upscalers(State(state): State<AppState>) -> Listing {
    listing(state.sd_api.upscalers().await)
}

/// GET /api/v1/backend/embeddings
pub async fn list_embeddings(State(state): State<AppState>) -> Listing {
    listing(state.sd_api.embeddings().await)
}

/// GET /api/v1/backend/loras
pub async fn list_loras(State(state): State<AppState>) -> Listing {
    listing(state.sd_api.loras().await)
}

/// GET /api/v1/backend/vaes
pub async fn list_vaes(State(state): State<AppState>) -> Listing {
    listing(state.sd_api.vaes().await)
}

/// GET /api/v1/backend/smi
///
/// Combined output of the GPU status command (`nvidia-smi` by default).
pub async fn gpu_status(
    State(state): State<AppState>,
    Requester(origin): Requester,
) -> AppResult<Json<DataResponse<String>>> {
    let command = &state.config.smi_command;
    tracing::debug!(requester_id = origin.requester_id, %command, "Running GPU status command");

    let output = Command::new(command)
        .output()
        .await
        .map_err(|e| AppError::InternalError(format!("error running {command}: {e}")))?;
    if !output.status.success() {
        return Err(AppError::InternalError(format!(
            "error running {command}: {}",
            output.status
        )));
    }

    let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
    report.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(Json(DataResponse { data: report }))
}
