//! REST API client for the Stable Diffusion WebUI (`/sdapi/v1`).
//!
//! Covers the endpoints the queue needs (render, upscale, progress,
//! interrupt) plus the listing endpoints exposed through the HTTP frontend.
//! Images travel base64-encoded in both directions.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use renderq_core::params::{RenderParams, UpscaleParams};
use renderq_core::progress::Progress;
use serde::{Deserialize, Serialize};

use crate::backend::{Images, RenderBackend};
use crate::error::BackendError;

/// Default base URL of a locally running WebUI.
pub const DEFAULT_API_URL: &str = "http://localhost:7860/sdapi/v1";

/// Progress polls must be quick; a stuck poll would stall the display.
const PROGRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// HTTP client for a single WebUI instance.
pub struct SdApi {
    client: reqwest::Client,
    api_url: String,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /txt2img`.
#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    enable_hr: bool,
    denoising_strength: f32,
    hr_scale: f32,
    hr_upscaler: &'a str,
    hr_second_pass_steps: u32,
    hr_sampler_name: &'a str,
    hr_prompt: &'a str,
    hr_negative_prompt: &'a str,
    prompt: &'a str,
    seed: u32,
    sampler_name: &'a str,
    batch_size: u32,
    n_iter: u32,
    steps: u32,
    cfg_scale: f32,
    width: u32,
    height: u32,
    negative_prompt: &'a str,
    override_settings: OverrideSettings<'a>,
    send_images: bool,
}

#[derive(Debug, Serialize)]
struct OverrideSettings<'a> {
    sd_model_checkpoint: &'a str,
}

impl<'a> Txt2ImgRequest<'a> {
    fn from_params(p: &'a RenderParams) -> Self {
        Self {
            enable_hr: p.high_res.enabled(),
            denoising_strength: p.high_res.denoising_strength,
            hr_scale: p.high_res.scale,
            hr_upscaler: &p.high_res.upscaler,
            hr_second_pass_steps: p.high_res.second_pass_steps,
            hr_sampler_name: &p.sampler,
            hr_prompt: &p.prompt,
            hr_negative_prompt: &p.negative_prompt,
            prompt: &p.prompt,
            seed: p.seed,
            sampler_name: &p.sampler,
            batch_size: p.num_outputs,
            n_iter: 1,
            steps: p.steps,
            cfg_scale: p.cfg_scale,
            width: p.width,
            height: p.height,
            negative_prompt: &p.negative_prompt,
            override_settings: OverrideSettings {
                sd_model_checkpoint: &p.model,
            },
            send_images: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Body of `POST /extra-single-image`.
#[derive(Debug, Serialize)]
struct ExtraSingleImageRequest<'a> {
    image: String,
    resize_mode: u8,
    upscaling_resize: f32,
    upscaler_1: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtraSingleImageResponse {
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize)]
struct ProgressResponse {
    #[serde(default)]
    progress: f32,
    #[serde(default)]
    eta_relative: f32,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    model_name: String,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    loaded: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl SdApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base URL including the API prefix, e.g.
    ///   `http://localhost:7860/sdapi/v1`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `POST /txt2img`; returns the decoded images.
    pub async fn txt2img(&self, params: &RenderParams) -> Result<Images, BackendError> {
        let response = self
            .client
            .post(self.url("txt2img"))
            .json(&Txt2ImgRequest::from_params(params))
            .send()
            .await?;

        let body: Txt2ImgResponse = Self::parse_response(response).await?;
        if body.images.is_empty() {
            return Err(BackendError::NoImages);
        }
        body.images.iter().map(|img| decode_image(img)).collect()
    }

    /// `POST /extra-single-image`; upscales one image.
    pub async fn extra_single_image(
        &self,
        params: &UpscaleParams,
        image: &[u8],
    ) -> Result<Images, BackendError> {
        let request = ExtraSingleImageRequest {
            image: BASE64.encode(image),
            resize_mode: 0,
            upscaling_resize: params.scale,
            upscaler_1: &params.upscaler,
        };
        let response = self
            .client
            .post(self.url("extra-single-image"))
            .json(&request)
            .send()
            .await?;

        let body: ExtraSingleImageResponse = Self::parse_response(response).await?;
        if body.image.is_empty() {
            return Err(BackendError::NoImages);
        }
        Ok(vec![decode_image(&body.image)?])
    }

    /// `GET /progress`; percent is the backend's 0..1 progress times 100.
    ///
    /// A non-empty `detail` field is the WebUI's way of reporting an error
    /// and is returned as [`BackendError::Detail`].
    pub async fn get_progress(&self) -> Result<Progress, BackendError> {
        let response = self
            .client
            .get(self.url("progress"))
            .query(&[("skip_current_image", "false")])
            .timeout(PROGRESS_TIMEOUT)
            .send()
            .await?;

        let body: ProgressResponse = Self::parse_response(response).await?;
        if let Some(detail) = body.detail.as_ref().and_then(detail_text) {
            return Err(BackendError::Detail(detail));
        }

        // Negative, NaN and out-of-range estimates read as "unknown".
        let eta = Duration::try_from_secs_f32(body.eta_relative).unwrap_or_default();
        Ok(Progress {
            percent: (body.progress * 100.0) as i32,
            eta,
        })
    }

    /// `POST /interrupt`.
    pub async fn post_interrupt(&self) -> Result<(), BackendError> {
        let response = self.client.post(self.url("interrupt")).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Checkpoint names (`GET /sd-models`).
    pub async fn models(&self) -> Result<Vec<String>, BackendError> {
        let entries: Vec<ModelEntry> = self.get_json("sd-models").await?;
        Ok(entries.into_iter().map(|e| e.model_name).collect())
    }

    /// Sampler names (`GET /samplers`).
    pub async fn samplers(&self) -> Result<Vec<String>, BackendError> {
        self.named_list("samplers").await
    }

    /// Upscaler names (`GET /upscalers`).
    pub async fn upscalers(&self) -> Result<Vec<String>, BackendError> {
        self.named_list("upscalers").await
    }

    /// Loaded textual-inversion embeddings (`GET /embeddings`), sorted.
    pub async fn embeddings(&self) -> Result<Vec<String>, BackendError> {
        let body: EmbeddingsResponse = self.get_json("embeddings").await?;
        Ok(body.loaded.into_keys().collect())
    }

    /// LoRA names (`GET /loras`).
    pub async fn loras(&self) -> Result<Vec<String>, BackendError> {
        self.named_list("loras").await
    }

    /// VAE names (`GET /sd-vae`).
    pub async fn vaes(&self) -> Result<Vec<String>, BackendError> {
        let entries: Vec<ModelEntry> = self.get_json("sd-vae").await?;
        Ok(entries.into_iter().map(|e| e.model_name).collect())
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    async fn named_list(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let entries: Vec<NamedEntry> = self.get_json(path).await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::parse_response(response).await
    }

    /// Ensure the response has a success status code.
    ///
    /// `429` becomes [`BackendError::RateLimited`] using the `Retry-After`
    /// header when present; every other failure becomes
    /// [`BackendError::Api`] carrying the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
                message: body,
            });
        }
        Err(BackendError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RenderBackend for SdApi {
    async fn render(&self, params: &RenderParams) -> Result<Images, BackendError> {
        self.txt2img(params).await
    }

    async fn upscale(&self, params: &UpscaleParams, image: &[u8]) -> Result<Images, BackendError> {
        self.extra_single_image(params, image).await
    }

    async fn progress(&self) -> Result<Progress, BackendError> {
        self.get_progress().await
    }

    async fn interrupt(&self) -> Result<(), BackendError> {
        self.post_interrupt().await
    }
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, BackendError> {
    // Some WebUI versions prefix a data URL header.
    let payload = encoded
        .split_once(";base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded);
    BASE64
        .decode(payload)
        .map_err(|e| BackendError::Decode(format!("image base64 decode error: {e}")))
}

/// Text of a `detail` field; empty strings and nulls are not errors.
fn detail_text(detail: &serde_json::Value) -> Option<String> {
    match detail {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
