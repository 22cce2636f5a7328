//! Messaging frontend seam.
//!
//! The queue talks to requesters only through [`Messenger`]: one status
//! message per job (sent, edited, deleted) and one multi-image upload when
//! the job succeeds.

use std::time::Duration;

use async_trait::async_trait;
use renderq_core::retry::parse_retry_after;
use renderq_core::types::{DbId, Origin};
use serde::{Deserialize, Serialize};

/// Handle of a message previously sent through [`Messenger::send_reply`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationRef {
    pub chat_id: DbId,
    pub message_id: DbId,
}

/// One image of a multi-image upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    /// Attachment name, unique per job and item.
    pub filename: String,
    pub data: Vec<u8>,
    /// Only the first item of an upload carries a caption.
    pub caption: Option<String>,
}

/// Errors reported by the messaging frontend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessengerError {
    /// The transport asked us to wait before the next call.
    #[error("rate limited: {{\"retry_after\":{}}}", .0.as_secs())]
    RateLimited(Duration),

    /// Any other delivery failure, verbatim.
    #[error("{0}")]
    Transport(String),
}

impl MessengerError {
    /// Wait hint of a throttling error, typed or embedded in the text.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MessengerError::RateLimited(wait) => Some(*wait),
            MessengerError::Transport(msg) => parse_retry_after(msg),
        }
    }
}

/// Outbound side of the messaging frontend.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a new reply to `origin` and return its handle.
    async fn send_reply(&self, origin: &Origin, text: &str) -> Result<NotificationRef, MessengerError>;

    /// Replace the text of a previously sent reply.
    async fn edit_reply(&self, notification: &NotificationRef, text: &str) -> Result<(), MessengerError>;

    /// Remove a previously sent reply.
    async fn delete_reply(&self, notification: &NotificationRef) -> Result<(), MessengerError>;

    /// The reply shows its final text and will not be edited again.
    async fn release_reply(&self, _notification: &NotificationRef) {}

    /// Deliver images as one grouped upload addressed to `origin`.
    async fn upload_images(&self, origin: &Origin, items: &[UploadItem]) -> Result<(), MessengerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_text_hint_is_parsed() {
        let err = MessengerError::Transport(r#"Too Many Requests: {"retry_after":5}"#.into());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(MessengerError::Transport("forbidden".into()).retry_after(), None);
    }

    #[test]
    fn typed_rate_limit_renders_hint() {
        let err = MessengerError::RateLimited(Duration::from_secs(2));
        assert_eq!(err.to_string(), r#"rate limited: {"retry_after":2}"#);
    }
}
