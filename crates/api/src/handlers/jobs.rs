//! Handlers for job submission, cancellation and input delivery.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use renderq_core::params::{
    HighResParams, JobParams, OutputFormat, PostUpscale, RenderDefaults, RenderParams,
    UpscaleParams,
};
use renderq_queue::{InputFile, JobTicket};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::Requester;
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the source image.
const INPUT_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /jobs/render. Unset fields take the configured
/// defaults.
#[derive(Debug, Default, Deserialize)]
pub struct RenderRequest {
    pub prompt: String,
    /// Raw text the requester typed; defaults to the prompt.
    pub original_input: Option<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub num_outputs: Option<u32>,
    pub cfg_scale: Option<f32>,
    pub sampler: Option<String>,
    pub model: Option<String>,
    pub output: Option<OutputFormat>,
    pub upscale: Option<PostUpscale>,
    pub high_res: Option<HighResParams>,
}

impl RenderRequest {
    /// Resolve against `defaults`. A model override without explicit
    /// dimensions picks that model's default size.
    pub fn into_params(self, defaults: &RenderDefaults) -> RenderParams {
        let mut params = defaults.render_params(self.prompt);
        if let Some(model) = self.model {
            (params.width, params.height) = defaults.dimensions_for(&model);
            params.model = model;
        }
        if let Some(input) = self.original_input {
            params.original_input = input;
        }
        if let Some(negative) = self.negative_prompt {
            params.negative_prompt = negative;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        if let Some(width) = self.width {
            params.width = width;
        }
        if let Some(height) = self.height {
            params.height = height;
        }
        if let Some(steps) = self.steps {
            params.steps = steps;
        }
        if let Some(n) = self.num_outputs {
            params.num_outputs = n;
        }
        if let Some(cfg) = self.cfg_scale {
            params.cfg_scale = cfg;
        }
        if let Some(sampler) = self.sampler {
            params.sampler = sampler;
        }
        if let Some(output) = self.output {
            params.output = output;
        }
        if let Some(upscale) = self.upscale {
            params.upscale = upscale;
        }
        if let Some(high_res) = self.high_res {
            params.high_res = high_res;
        }
        params
    }
}

/// Request body for POST /jobs/upscale.
#[derive(Debug, Default, Deserialize)]
pub struct UpscaleRequest {
    pub original_input: Option<String>,
    pub scale: Option<f32>,
    pub upscaler: Option<String>,
    pub output: Option<OutputFormat>,
}

impl UpscaleRequest {
    pub fn into_params(self) -> UpscaleParams {
        let defaults = UpscaleParams::default();
        UpscaleParams {
            original_input: self.original_input.unwrap_or_default(),
            scale: self.scale.unwrap_or(defaults.scale),
            upscaler: self.upscaler.unwrap_or(defaults.upscaler),
            output: self.output.unwrap_or(defaults.output),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResult {
    pub canceled: bool,
}

#[derive(Debug, Serialize)]
pub struct InputResult {
    pub filename: String,
    pub bytes: usize,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/render
pub async fn submit_render(
    State(state): State<AppState>,
    Requester(origin): Requester,
    Json(input): Json<RenderRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<JobTicket>>)> {
    let params = JobParams::Render(input.into_params(&state.config.render_defaults));
    submit(&state, params, origin).await
}

/// POST /api/v1/jobs/upscale
///
/// The job waits at the head of the queue for the source image, delivered
/// through POST /jobs/input.
pub async fn submit_upscale(
    State(state): State<AppState>,
    Requester(origin): Requester,
    Json(input): Json<UpscaleRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<JobTicket>>)> {
    submit(&state, JobParams::Upscale(input.into_params()), origin).await
}

async fn submit(
    state: &AppState,
    params: JobParams,
    origin: renderq_core::types::Origin,
) -> AppResult<(StatusCode, Json<DataResponse<JobTicket>>)> {
    params.validate()?;

    let requester_id = origin.requester_id;
    let kind = params.kind();
    let ticket = state.queue.add(params, origin).await;
    tracing::info!(
        task_id = %ticket.task_id,
        requester_id,
        ?kind,
        position = ticket.position,
        "Job queued",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: ticket })))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/cancel
///
/// Cancels the job at the head of the queue.
pub async fn cancel(
    State(state): State<AppState>,
    Requester(origin): Requester,
) -> AppResult<Json<DataResponse<CancelResult>>> {
    state.queue.cancel_current()?;
    tracing::info!(requester_id = origin.requester_id, "Cancel requested");
    Ok(Json(DataResponse {
        data: CancelResult { canceled: true },
    }))
}

/// POST /api/v1/jobs/input
///
/// Multipart upload of the source image for the requester's waiting
/// upscale job. The image field is named `file`.
pub async fn deliver_input(
    State(state): State<AppState>,
    Requester(origin): Requester,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<InputResult>>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(INPUT_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("image").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
            .to_vec();

        let result = InputResult {
            filename: filename.clone(),
            bytes: data.len(),
        };
        state.queue.deliver_input(InputFile {
            data,
            filename,
            origin,
        })?;
        return Ok(Json(DataResponse { data: result }));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{INPUT_FIELD}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> RenderDefaults {
        RenderDefaults {
            model: "v1-5".into(),
            sampler: "Euler a".into(),
            ..RenderDefaults::default()
        }
    }

    #[test]
    fn unset_fields_take_defaults() {
        let params = RenderRequest {
            prompt: "a cat".into(),
            ..Default::default()
        }
        .into_params(&defaults());
        assert_eq!(params.original_input, "a cat");
        assert_eq!((params.width, params.height), (512, 512));
        assert_eq!(params.sampler, "Euler a");
        assert_eq!(params.model, "v1-5");
    }

    #[test]
    fn sdxl_model_override_picks_sdxl_size() {
        let params = RenderRequest {
            prompt: "a cat".into(),
            model: Some("dreamshaper-SDXL".into()),
            ..Default::default()
        }
        .into_params(&defaults());
        assert_eq!((params.width, params.height), (1024, 1024));
    }

    #[test]
    fn explicit_size_wins_over_model_default() {
        let params = RenderRequest {
            prompt: "a cat".into(),
            model: Some("dreamshaper-sdxl".into()),
            width: Some(768),
            ..Default::default()
        }
        .into_params(&defaults());
        assert_eq!((params.width, params.height), (768, 1024));
    }

    #[test]
    fn upscale_request_defaults() {
        let params = UpscaleRequest::default().into_params();
        assert_eq!(params, UpscaleParams::default());
    }
}
