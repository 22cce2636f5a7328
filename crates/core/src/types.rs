use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifiers handed to us by the messaging frontend (users, chats, messages).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Random 64-bit identifier assigned to every queued job.
///
/// Used to namespace generated attachment filenames so that two uploads
/// for different jobs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Draw a fresh random identifier.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a conversation has one or many participants.
///
/// Group conversations get a slower progress refresh rate so a busy
/// chat is not flooded with edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Direct,
    Group,
}

/// Reference to the inbound message that created (or last fed) a job.
///
/// Replies and uploads are addressed to this origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// The user who sent the message.
    pub requester_id: DbId,
    /// The conversation the message was posted in.
    pub chat_id: DbId,
    #[serde(default)]
    pub chat_kind: ChatKind,
    /// Frontend-specific message identifier to reply to, if any.
    #[serde(default)]
    pub message_id: Option<DbId>,
}

impl Origin {
    /// Origin for a one-to-one conversation with `requester_id`.
    pub fn direct(requester_id: DbId) -> Self {
        Self {
            requester_id,
            chat_id: requester_id,
            chat_kind: ChatKind::Direct,
            message_id: None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.chat_kind == ChatKind::Group
    }
}
