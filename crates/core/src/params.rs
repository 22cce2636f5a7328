//! Render and upscale request parameters.
//!
//! [`JobParams`] is the tagged union carried by every queue entry. Both
//! variants expose the same two capabilities: a short human-readable
//! [`summary`](JobParams::summary) used in progress notifications and
//! captions, and the [`original_input`](JobParams::original_input) text the
//! requester typed.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default number of sampling steps for a render.
pub const DEFAULT_STEPS: u32 = 35;
/// Default number of images produced by one render.
pub const DEFAULT_NUM_OUTPUTS: u32 = 4;
/// Default classifier-free guidance scale.
pub const DEFAULT_CFG_SCALE: f32 = 7.0;
/// Default upscaler for post-render and standalone upscales.
pub const DEFAULT_UPSCALER: &str = "LDSR";
/// Default scale factor for standalone upscale jobs.
pub const DEFAULT_UPSCALE_SCALE: f32 = 4.0;
/// Default upscaler used by the backend's high-res second pass.
pub const DEFAULT_HR_UPSCALER: &str = "R-ESRGAN 4x+";
/// Default denoising strength of the high-res second pass.
pub const DEFAULT_HR_DENOISING_STRENGTH: f32 = 0.4;
/// Default number of steps of the high-res second pass.
pub const DEFAULT_HR_SECOND_PASS_STEPS: u32 = 15;

/// Negative prompts longer than this are shortened in summaries.
const NEGATIVE_PROMPT_SUMMARY_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// Format the finished images are delivered in.
///
/// The backend always produces PNG; anything else is transcoded before
/// upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn is_png(self) -> bool {
        self == OutputFormat::Png
    }
}

// ---------------------------------------------------------------------------
// Upscale
// ---------------------------------------------------------------------------

/// Parameters of a backend upscale operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleParams {
    /// Text the requester sent to create the job.
    #[serde(default)]
    pub original_input: String,
    pub scale: f32,
    pub upscaler: String,
    #[serde(default)]
    pub output: OutputFormat,
}

impl Default for UpscaleParams {
    fn default() -> Self {
        Self {
            original_input: String::new(),
            scale: DEFAULT_UPSCALE_SCALE,
            upscaler: DEFAULT_UPSCALER.to_string(),
            output: OutputFormat::default(),
        }
    }
}

impl UpscaleParams {
    /// Short description, e.g. `🔎 LDSRx4/PNG`.
    pub fn summary(&self) -> String {
        let mut res = format!("🔎 {}x{}", self.upscaler, self.scale);
        if self.output.is_png() {
            res.push_str("/PNG");
        }
        res
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.scale > 0.0) {
            return Err(CoreError::Validation(
                "upscale factor must be greater than zero".into(),
            ));
        }
        if self.upscaler.trim().is_empty() {
            return Err(CoreError::Validation("upscaler must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Upscale applied by the queue after a render finishes.
///
/// A `scale` of zero disables the chained stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostUpscale {
    pub scale: f32,
    pub upscaler: String,
}

impl Default for PostUpscale {
    fn default() -> Self {
        Self {
            scale: 0.0,
            upscaler: DEFAULT_UPSCALER.to_string(),
        }
    }
}

/// The backend's own high-resolution second pass.
///
/// A `scale` of zero disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighResParams {
    pub scale: f32,
    pub denoising_strength: f32,
    pub upscaler: String,
    pub second_pass_steps: u32,
}

impl Default for HighResParams {
    fn default() -> Self {
        Self {
            scale: 0.0,
            denoising_strength: DEFAULT_HR_DENOISING_STRENGTH,
            upscaler: DEFAULT_HR_UPSCALER.to_string(),
            second_pass_steps: DEFAULT_HR_SECOND_PASS_STEPS,
        }
    }
}

impl HighResParams {
    pub fn enabled(&self) -> bool {
        self.scale > 0.0
    }
}

/// Parameters of a text-to-image render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    /// Text the requester sent to create the job.
    #[serde(default)]
    pub original_input: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub seed: u32,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub num_outputs: u32,
    pub cfg_scale: f32,
    pub sampler: String,
    pub model: String,
    #[serde(default)]
    pub output: OutputFormat,
    #[serde(default)]
    pub upscale: PostUpscale,
    #[serde(default)]
    pub high_res: HighResParams,
}

impl RenderParams {
    /// Whether a chained upscale stage will run after the render.
    pub fn wants_post_upscale(&self) -> bool {
        self.upscale.scale > 0.0 && !self.high_res.enabled()
    }

    /// Resolve mutually exclusive options before execution.
    ///
    /// The backend's high-res pass and the chained post-upscale cannot be
    /// combined: high-res wins and the post-upscale factor is zeroed. Any
    /// form of upscaling limits the render to a single output image.
    pub fn normalize(&mut self) {
        if self.high_res.enabled() {
            self.upscale.scale = 0.0;
        }
        if self.high_res.enabled() || self.upscale.scale > 0.0 {
            self.num_outputs = 1;
        }
    }

    /// Parameters for the upscale stage chained after this render.
    pub fn post_upscale_params(&self) -> UpscaleParams {
        UpscaleParams {
            original_input: self.original_input.clone(),
            scale: self.upscale.scale,
            upscaler: self.upscale.upscaler.clone(),
            output: self.output,
        }
    }

    /// Short description, e.g. `🌱123 👟35 🕹7.0 🖼512x512x4 🔭Euler a 🧩model`.
    pub fn summary(&self) -> String {
        let num_outputs = if self.num_outputs > 1 {
            format!("x{}", self.num_outputs)
        } else {
            String::new()
        };
        let out_format = if self.output.is_png() { "/PNG" } else { "" };

        let mut res = format!(
            "🌱{} 👟{} 🕹{:.1} 🖼{}x{}{}{} 🔭{} 🧩{}",
            self.seed,
            self.steps,
            self.cfg_scale,
            self.width,
            self.height,
            num_outputs,
            out_format,
            self.sampler,
            self.model,
        );

        if self.high_res.enabled() {
            res.push_str(&format!(
                " 🔎 {}x{}/{}",
                self.high_res.upscaler, self.high_res.scale, self.high_res.denoising_strength
            ));
        } else if self.upscale.scale > 0.0 {
            res.push(' ');
            res.push_str(&self.post_upscale_params().summary());
        }

        if !self.negative_prompt.is_empty() {
            let mut neg: String = self
                .negative_prompt
                .chars()
                .take(NEGATIVE_PROMPT_SUMMARY_LEN)
                .collect();
            if self.negative_prompt.chars().count() > NEGATIVE_PROMPT_SUMMARY_LEN {
                neg.push_str("...");
            }
            res = format!("📍{neg} {res}");
        }
        res
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("missing prompt".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(CoreError::Validation(
                "width and height must be greater than zero".into(),
            ));
        }
        if self.steps == 0 {
            return Err(CoreError::Validation("steps must be greater than zero".into()));
        }
        if self.num_outputs == 0 {
            return Err(CoreError::Validation(
                "output count must be greater than zero".into(),
            ));
        }
        if self.upscale.scale < 0.0 || self.high_res.scale < 0.0 {
            return Err(CoreError::Validation("scale factors must not be negative".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults resolved from configuration
// ---------------------------------------------------------------------------

/// Process-wide render defaults (model, sampler, dimensions).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDefaults {
    pub model: String,
    pub sampler: String,
    pub width: u32,
    pub height: u32,
    pub width_sdxl: u32,
    pub height_sdxl: u32,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            model: String::new(),
            sampler: String::new(),
            width: 512,
            height: 512,
            width_sdxl: 1024,
            height_sdxl: 1024,
        }
    }
}

impl RenderDefaults {
    /// Default dimensions for `model`.
    ///
    /// Models whose name ends in `sdxl` (case-insensitive) get the SDXL
    /// defaults.
    pub fn dimensions_for(&self, model: &str) -> (u32, u32) {
        if model.to_lowercase().ends_with("sdxl") {
            (self.width_sdxl, self.height_sdxl)
        } else {
            (self.width, self.height)
        }
    }

    /// Build render parameters for `prompt`, filling everything else from
    /// the defaults. The seed is drawn at random.
    pub fn render_params(&self, prompt: impl Into<String>) -> RenderParams {
        let prompt = prompt.into();
        let (width, height) = self.dimensions_for(&self.model);
        RenderParams {
            original_input: prompt.clone(),
            prompt,
            negative_prompt: String::new(),
            seed: rand::random(),
            width,
            height,
            steps: DEFAULT_STEPS,
            num_outputs: DEFAULT_NUM_OUTPUTS,
            cfg_scale: DEFAULT_CFG_SCALE,
            sampler: self.sampler.clone(),
            model: self.model.clone(),
            output: OutputFormat::default(),
            upscale: PostUpscale::default(),
            high_res: HighResParams::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// Discriminant of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Render,
    Upscale,
}

/// Parameters of a queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParams {
    Render(RenderParams),
    Upscale(UpscaleParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Render(_) => JobKind::Render,
            JobParams::Upscale(_) => JobKind::Upscale,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            JobParams::Render(p) => p.summary(),
            JobParams::Upscale(p) => p.summary(),
        }
    }

    pub fn original_input(&self) -> &str {
        match self {
            JobParams::Render(p) => &p.original_input,
            JobParams::Upscale(p) => &p.original_input,
        }
    }

    /// Upscale jobs need the requester to upload the source image first.
    pub fn needs_input(&self) -> bool {
        self.kind() == JobKind::Upscale
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            JobParams::Render(p) => p.validate(),
            JobParams::Upscale(p) => p.validate(),
        }
    }
}
