//! Admission control.
//!
//! [`RenderQueue`] holds the ordered list of entries and the bookkeeping of
//! the one job currently executing. Position 0, when present, is always the
//! running job; everything behind it waits in FIFO order. A single
//! exclusive lock guards both, and it is only held for short bookkeeping
//! sections, never across a backend or frontend call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use renderq_backend::{BackendSupervisor, RenderBackend};
use renderq_core::messages;
use renderq_core::params::JobParams;
use renderq_core::types::{DbId, Origin, TaskId};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{JobError, QueueError};
use crate::job::{InputFile, JobEntry, JobSnapshot, JobState, JobTicket};
use crate::messenger::Messenger;
use crate::processor::Processor;
use crate::runner::Services;
use crate::status::StatusMessage;

/// Bookkeeping of the job at position 0 while the processor runs it.
pub(crate) struct CurrentJob {
    pub task_id: TaskId,
    pub requester_id: DbId,
    pub token: CancellationToken,
    /// Set only by an explicit cancellation (or shutdown).
    pub canceled: bool,
    /// Present only while an upscale job waits for its source image.
    pub input_tx: Option<oneshot::Sender<InputFile>>,
}

#[derive(Default)]
pub(crate) struct QueueState {
    pub entries: VecDeque<Arc<JobEntry>>,
    pub current: Option<CurrentJob>,
    /// Cancellation that arrived before the processor picked up the front
    /// entry.
    pub cancel_front: bool,
}

/// The single-worker render queue.
pub struct RenderQueue {
    pub(crate) state: Mutex<QueueState>,
    /// Coalescing wake signal: at most one pending permit.
    pub(crate) wake: Notify,
    pub(crate) shutdown: CancellationToken,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) services: Services,
}

impl RenderQueue {
    /// Create a queue. Nothing runs until [`start`](Self::start).
    ///
    /// Without a `supervisor`, an unreachable backend fails the job
    /// instead of being restarted.
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        messenger: Arc<dyn Messenger>,
        supervisor: Option<Arc<dyn BackendSupervisor>>,
        config: QueueConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            messenger,
            services: Services {
                backend,
                supervisor,
                config,
            },
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.services.config
    }

    /// Spawn the processor task.
    ///
    /// The task returns `Err` only for a fatal error (the backend could not
    /// be started), after which the queue stops processing.
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<(), JobError>> {
        tokio::spawn(Processor::new(self.clone()).run())
    }

    /// Stop the processor: the running job ends as canceled, queued jobs are
    /// left untouched.
    pub fn shutdown(&self) {
        {
            let mut st = self.lock();
            if let Some(current) = st.current.as_mut() {
                current.canceled = true;
            }
        }
        self.shutdown.cancel();
    }

    /// Append a job to the tail of the queue.
    ///
    /// When other jobs are ahead of it, the requester is told its position
    /// (the number of entries before it) before this returns. The queue
    /// lock is not held while that message is sent.
    pub async fn add(&self, params: JobParams, origin: Origin) -> JobTicket {
        let task_id = TaskId::random();
        let status = Arc::new(tokio::sync::Mutex::new(StatusMessage::new(
            self.messenger.clone(),
            origin.clone(),
        )));

        let (position, queued_guard) = {
            let mut st = self.lock();
            let position = st.entries.len();
            // Taken before the entry becomes visible, so the processor's
            // renumbering cannot overtake this first notification.
            let queued_guard = if position > 0 {
                status.clone().try_lock_owned().ok()
            } else {
                None
            };
            st.entries.push_back(Arc::new(JobEntry {
                task_id,
                params,
                origin,
                enqueued_at: chrono::Utc::now(),
                status,
            }));
            (position, queued_guard)
        };
        self.wake.notify_one();

        tracing::info!(%task_id, position, "Request queued");
        if let Some(mut status) = queued_guard {
            status.update(&messages::queued_at(position)).await;
        }

        JobTicket { task_id, position }
    }

    /// Cancel the job at position 0.
    ///
    /// Queued jobs behind it are never affected.
    pub fn cancel_current(&self) -> Result<(), QueueError> {
        let mut st = self.lock();
        if st.entries.is_empty() {
            tracing::debug!("No active request to cancel");
            return Err(QueueError::NoActiveJob);
        }
        match st.current.as_mut() {
            Some(current) => {
                tracing::info!(task_id = %current.task_id, "Canceling current request");
                current.canceled = true;
                current.token.cancel();
            }
            None => st.cancel_front = true,
        }
        Ok(())
    }

    /// Hand an uploaded file to the running job.
    ///
    /// Accepted only when the current job is waiting for input and belongs
    /// to the file's sender.
    pub fn deliver_input(&self, file: InputFile) -> Result<(), QueueError> {
        let mut st = self.lock();
        let current = st
            .current
            .as_mut()
            .filter(|c| c.requester_id == file.origin.requester_id)
            .ok_or(QueueError::NotAwaitingInput)?;
        let input_tx = current.input_tx.take().ok_or(QueueError::NotAwaitingInput)?;
        tracing::info!(task_id = %current.task_id, bytes = file.data.len(), "Input file delivered");
        input_tx.send(file).map_err(|_| QueueError::NotAwaitingInput)
    }

    /// Read-only view of the queue, running job first.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let st = self.lock();
        st.entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let state = match (position, st.current.as_ref()) {
                    (0, Some(current)) if current.input_tx.is_some() => JobState::AwaitingInput,
                    (0, Some(_)) => JobState::Running,
                    _ => JobState::Queued,
                };
                JobSnapshot {
                    task_id: entry.task_id,
                    kind: entry.params.kind(),
                    state,
                    position,
                    requester_id: entry.origin.requester_id,
                    chat_id: entry.origin.chat_id,
                    summary: entry.params.summary(),
                    enqueued_at: entry.enqueued_at,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the queue state. A panic while holding the lock cannot leave the
    /// bookkeeping half-updated, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
