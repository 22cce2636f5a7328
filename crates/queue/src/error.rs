//! Queue and job error taxonomy.

use renderq_backend::BackendError;

/// Errors returned to callers of the queue API.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Cancellation requested while nothing is queued.
    #[error("no active request to cancel")]
    NoActiveJob,

    /// An input file arrived but no job of that requester is waiting for one.
    #[error("no request is waiting for an image from this user")]
    NotAwaitingInput,
}

/// Terminal failure of one job.
///
/// The `Display` text is what the requester sees after `❌ Error: `.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    /// Explicitly canceled by the requester.
    #[error("canceled")]
    Canceled,

    /// The job's deadline fired (or it was stopped) while a stage ran.
    #[error("timeout")]
    Timeout,

    /// An upscale job never received its source image.
    #[error("waiting for image data timeout")]
    InputTimeout,

    /// The delivered source image was empty.
    #[error("got no image data")]
    NoInputData,

    /// The backend is down and could not be brought back.
    #[error("{0}")]
    BackendUnreachable(String),

    /// The backend kept throttling after one retry.
    #[error("{0}")]
    BackendRateLimited(String),

    /// Any other backend failure, verbatim.
    #[error("{0}")]
    Backend(String),

    /// The supervisor could not start the backend. Fatal for the process.
    #[error("{0}")]
    BackendStartFailed(String),

    #[error("send images error: {0}")]
    Upload(String),

    #[error("{0}")]
    Transcode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Errors that must stop the processor instead of failing one job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::BackendStartFailed(_))
    }
}

impl From<BackendError> for JobError {
    fn from(e: BackendError) -> Self {
        if e.is_unreachable() {
            JobError::BackendUnreachable(e.to_string())
        } else if e.retry_after().is_some() {
            JobError::BackendRateLimited(e.to_string())
        } else {
            JobError::Backend(e.to_string())
        }
    }
}

impl From<renderq_core::error::CoreError> for JobError {
    fn from(e: renderq_core::error::CoreError) -> Self {
        match e {
            renderq_core::error::CoreError::Transcode(msg) => JobError::Transcode(msg),
            other => JobError::Internal(other.to_string()),
        }
    }
}
