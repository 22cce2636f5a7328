//! A job's single outward status message.
//!
//! Created by the first update, edited by later ones and deleted when the
//! job succeeds. Progress updates never sleep: when the frontend throttles
//! us, the wait is recorded and updates are skipped until it has passed,
//! after which the latest text is sent. Terminal updates do wait, so the
//! requester always sees the final state.

use std::sync::Arc;

use renderq_core::types::Origin;
use tokio::time::Instant;

use crate::messenger::{Messenger, MessengerError, NotificationRef};

pub(crate) struct StatusMessage {
    messenger: Arc<dyn Messenger>,
    origin: Origin,
    notification: Option<NotificationRef>,
    /// Text the frontend currently shows.
    shown: Option<String>,
    backoff_until: Option<Instant>,
}

impl StatusMessage {
    pub fn new(messenger: Arc<dyn Messenger>, origin: Origin) -> Self {
        Self {
            messenger,
            origin,
            notification: None,
            shown: None,
            backoff_until: None,
        }
    }

    /// Best-effort update. Unchanged text is not re-sent; failures are
    /// logged and a throttling hint suspends updates for its duration.
    pub async fn update(&mut self, text: &str) {
        if self.shown.as_deref() == Some(text) {
            return;
        }
        if let Some(until) = self.backoff_until {
            if Instant::now() < until {
                tracing::trace!("Status update skipped while rate limited");
                return;
            }
            self.backoff_until = None;
        }

        if let Err(e) = self.write(text).await {
            match e.retry_after() {
                Some(wait) => {
                    tracing::warn!(wait_secs = wait.as_secs(), "Status update rate limited");
                    self.backoff_until = Some(Instant::now() + wait);
                }
                None => tracing::warn!(error = %e, "Status update failed"),
            }
        }
    }

    /// Terminal update: waits out any back-off and retries once when
    /// throttled.
    pub async fn finish(&mut self, text: &str) {
        if let Some(until) = self.backoff_until.take() {
            tokio::time::sleep_until(until).await;
        }
        if self.shown.as_deref() != Some(text) {
            self.write_final(text).await;
        }
        if let Some(notification) = &self.notification {
            self.messenger.release_reply(notification).await;
        }
    }

    async fn write_final(&mut self, text: &str) {
        let result = match self.write(text).await {
            Err(e) => match e.retry_after() {
                Some(wait) => {
                    tracing::warn!(wait_secs = wait.as_secs(), "Final status rate limited, retrying");
                    tokio::time::sleep(wait).await;
                    self.write(text).await
                }
                None => Err(e),
            },
            ok => ok,
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Final status update failed");
        }
    }

    /// Remove the status message, if one was sent.
    pub async fn delete(&mut self) {
        let Some(notification) = self.notification.take() else {
            return;
        };
        self.shown = None;
        if let Err(e) = self.messenger.delete_reply(&notification).await {
            tracing::warn!(error = %e, "Status delete failed");
        }
    }

    async fn write(&mut self, text: &str) -> Result<(), MessengerError> {
        match &self.notification {
            None => {
                let notification = self.messenger.send_reply(&self.origin, text).await?;
                self.notification = Some(notification);
            }
            Some(notification) => {
                self.messenger.edit_reply(notification, text).await?;
            }
        }
        self.shown = Some(text.to_string());
        Ok(())
    }
}
