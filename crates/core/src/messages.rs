//! Status texts shown to requesters.
//!
//! Every job ends in exactly one terminal notification: deleted on success,
//! [`CANCELED`] on explicit cancellation, or [`error_text`] on failure.

/// Prompt posted while an upscale job waits for its source image.
pub const AWAITING_INPUT: &str = "🩻 Please post the image file to process.";

/// First status of a job that is about to run.
pub const STARTING: &str = "🛎 Starting render...";

/// Prefix of the in-progress status.
pub const PROCESSING: &str = "🔨 Processing";

/// Shown while finished images are being transcoded and uploaded.
pub const UPLOADING: &str = "☁ ️ Uploading...";

/// Bare error status, used when the cause is unknown.
pub const ERROR: &str = "❌ Error";

/// Terminal status of an explicitly canceled job.
pub const CANCELED: &str = "❌ Canceled";

/// Shown while the backend process is being (re)started.
pub const BACKEND_RESTARTING: &str =
    "⚠️ Stable Diffusion is not running, starting, please wait...";

/// Shown when the backend process could not be started.
pub const BACKEND_START_FAILED: &str =
    "☠️ Stable Diffusion start failed, please restart the bot";

/// Sent to admins when the server comes up.
pub const SERVER_STARTED: &str = "🤖 Bot started";

/// `👨‍👦‍👦 Request queued at position #N`.
pub fn queued_at(position: usize) -> String {
    format!("👨‍👦‍👦 Request queued at position #{position}")
}

/// `❌ Error: <cause>`.
pub fn error_text(cause: impl std::fmt::Display) -> String {
    format!("{ERROR}: {cause}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_position_text() {
        assert_eq!(queued_at(2), "👨‍👦‍👦 Request queued at position #2");
    }

    #[test]
    fn error_text_carries_cause() {
        assert_eq!(error_text("boom"), "❌ Error: boom");
    }
}
