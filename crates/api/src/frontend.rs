//! WebSocket messaging frontend.
//!
//! Implements the queue's [`Messenger`] seam on top of [`WsManager`]:
//! status messages become `notification_*` events pushed to the
//! requester's connections, and uploads are written to the output
//! directory (served under `/outputs`) and announced with an
//! `images_uploaded` event.
//!
//! Requesters without a live connection miss the events; written images
//! stay retrievable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::extract::ws::Message;
use renderq_core::messages;
use renderq_core::types::{DbId, Origin};
use renderq_queue::{Messenger, MessengerError, NotificationRef, UploadItem};
use serde::Serialize;

use crate::ws::WsManager;

/// URL prefix the output directory is served under.
pub const OUTPUTS_PREFIX: &str = "/outputs";

/// Events pushed to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrontendEvent {
    NotificationCreated {
        chat_id: DbId,
        message_id: DbId,
        reply_to: Option<DbId>,
        text: String,
    },
    NotificationUpdated {
        chat_id: DbId,
        message_id: DbId,
        text: String,
    },
    NotificationDeleted {
        chat_id: DbId,
        message_id: DbId,
    },
    ImagesUploaded {
        chat_id: DbId,
        reply_to: Option<DbId>,
        images: Vec<UploadedImage>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedImage {
    pub filename: String,
    pub url: String,
    pub caption: Option<String>,
}

pub struct WsMessenger {
    ws_manager: Arc<WsManager>,
    output_dir: PathBuf,
    next_message_id: AtomicI64,
    /// Live notification -> requester it was sent to.
    owners: Mutex<HashMap<DbId, DbId>>,
}

impl WsMessenger {
    pub fn new(ws_manager: Arc<WsManager>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            ws_manager,
            output_dir: output_dir.into(),
            next_message_id: AtomicI64::new(1),
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Notifications that can still be edited or deleted.
    pub fn tracked_notifications(&self) -> usize {
        self.owners().len()
    }

    fn owners(&self) -> MutexGuard<'_, HashMap<DbId, DbId>> {
        self.owners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn owner_of(&self, notification: &NotificationRef) -> Result<DbId, MessengerError> {
        self.owners()
            .get(&notification.message_id)
            .copied()
            .ok_or_else(|| {
                MessengerError::Transport(format!(
                    "message {} not found",
                    notification.message_id
                ))
            })
    }

    async fn push(&self, user_id: DbId, event: &FrontendEvent) -> Result<(), MessengerError> {
        let json = serde_json::to_string(event)
            .map_err(|e| MessengerError::Transport(format!("encode event: {e}")))?;
        let delivered = self
            .ws_manager
            .send_to_user(user_id, Message::Text(json.into()))
            .await;
        if delivered == 0 {
            tracing::debug!(user_id, "No live connection for notification");
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for WsMessenger {
    async fn send_reply(&self, origin: &Origin, text: &str) -> Result<NotificationRef, MessengerError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.owners().insert(message_id, origin.requester_id);

        let event = FrontendEvent::NotificationCreated {
            chat_id: origin.chat_id,
            message_id,
            reply_to: origin.message_id,
            text: text.to_string(),
        };
        self.push(origin.requester_id, &event).await?;
        Ok(NotificationRef {
            chat_id: origin.chat_id,
            message_id,
        })
    }

    async fn edit_reply(&self, notification: &NotificationRef, text: &str) -> Result<(), MessengerError> {
        let user_id = self.owner_of(notification)?;
        let event = FrontendEvent::NotificationUpdated {
            chat_id: notification.chat_id,
            message_id: notification.message_id,
            text: text.to_string(),
        };
        self.push(user_id, &event).await
    }

    async fn delete_reply(&self, notification: &NotificationRef) -> Result<(), MessengerError> {
        let user_id = self.owner_of(notification)?;
        self.owners().remove(&notification.message_id);
        let event = FrontendEvent::NotificationDeleted {
            chat_id: notification.chat_id,
            message_id: notification.message_id,
        };
        self.push(user_id, &event).await
    }

    async fn release_reply(&self, notification: &NotificationRef) {
        self.owners().remove(&notification.message_id);
    }

    async fn upload_images(&self, origin: &Origin, items: &[UploadItem]) -> Result<(), MessengerError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| MessengerError::Transport(format!("create output dir: {e}")))?;

        let mut images = Vec::with_capacity(items.len());
        for item in items {
            let name = safe_filename(&item.filename);
            let dest = self.output_dir.join(&name);
            tokio::fs::write(&dest, &item.data)
                .await
                .map_err(|e| MessengerError::Transport(format!("write {}: {e}", dest.display())))?;
            images.push(UploadedImage {
                url: format!("{OUTPUTS_PREFIX}/{name}"),
                filename: name,
                caption: item.caption.clone(),
            });
        }
        tracing::info!(
            requester_id = origin.requester_id,
            count = images.len(),
            "Images written",
        );

        let event = FrontendEvent::ImagesUploaded {
            chat_id: origin.chat_id,
            reply_to: origin.message_id,
            images,
        };
        self.push(origin.requester_id, &event).await
    }
}

/// Greet every admin with [`messages::SERVER_STARTED`].
///
/// Failures are logged; startup continues regardless.
pub async fn announce_startup(messenger: &dyn Messenger, admin_user_ids: &[DbId]) {
    for &admin in admin_user_ids {
        match messenger
            .send_reply(&Origin::direct(admin), messages::SERVER_STARTED)
            .await
        {
            Ok(notification) => messenger.release_reply(&notification).await,
            Err(e) => tracing::warn!(admin, error = %e, "Can't send startup notification"),
        }
    }
}

/// Last path component of `filename`, so uploads never leave the output
/// directory.
fn safe_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("image")
        .to_string()
}
