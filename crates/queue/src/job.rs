//! Queue entries and their public views.

use std::sync::Arc;

use renderq_core::params::{JobKind, JobParams};
use renderq_core::types::{DbId, Origin, TaskId, Timestamp};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::status::StatusMessage;

/// One request occupying a queue slot.
pub(crate) struct JobEntry {
    pub task_id: TaskId,
    pub params: JobParams,
    pub origin: Origin,
    pub enqueued_at: Timestamp,
    /// The job's single outward status message.
    pub status: Arc<Mutex<StatusMessage>>,
}

/// Source image delivered by the requester for an upscale job.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub data: Vec<u8>,
    pub filename: String,
    /// The message that carried the file; results are addressed to it.
    pub origin: Origin,
}

/// Returned by [`RenderQueue::add`](crate::RenderQueue::add).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobTicket {
    pub task_id: TaskId,
    /// Number of entries ahead of this one when it was queued.
    pub position: usize,
}

/// Lifecycle state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    AwaitingInput,
    Running,
}

/// Read-only view of one queue entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub task_id: TaskId,
    pub kind: JobKind,
    pub state: JobState,
    pub position: usize,
    pub requester_id: DbId,
    pub chat_id: DbId,
    pub summary: String,
    pub enqueued_at: Timestamp,
}
