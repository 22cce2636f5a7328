//! Collaborator traits consumed by the queue engine.

use async_trait::async_trait;
use renderq_core::params::{RenderParams, UpscaleParams};
use renderq_core::progress::Progress;

use crate::error::{BackendError, SupervisorError};

/// Encoded images (PNG) returned by a backend operation.
pub type Images = Vec<Vec<u8>>;

/// Operations the queue issues against the rendering backend.
///
/// Errors must let the caller tell an unreachable backend
/// ([`BackendError::Unreachable`]) and throttling
/// ([`BackendError::retry_after`]) apart from everything else.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Text-to-image render.
    async fn render(&self, params: &RenderParams) -> Result<Images, BackendError>;

    /// Upscale one encoded image.
    async fn upscale(&self, params: &UpscaleParams, image: &[u8]) -> Result<Images, BackendError>;

    /// Progress of the operation currently running on the backend.
    async fn progress(&self) -> Result<Progress, BackendError>;

    /// Ask the backend to abort whatever it is doing.
    async fn interrupt(&self) -> Result<(), BackendError>;
}

/// Starts the backend process when it is not reachable.
#[async_trait]
pub trait BackendSupervisor: Send + Sync {
    /// Return once the backend answers, starting it first if needed.
    async fn ensure_running(&self) -> Result<(), SupervisorError>;
}
