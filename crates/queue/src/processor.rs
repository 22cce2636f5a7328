//! The queue processor: job lifecycle state machine.
//!
//! ```text
//! Queued -> (AwaitingInput)? -> Running -> Succeeded | Canceled | Failed
//! ```
//!
//! One long-lived task drains the queue a job at a time. For each job it
//! renumbers the entries still waiting, builds a fresh
//! [`ExecutionContext`], waits for the source image when the job needs one,
//! runs the pipeline and then produces exactly one terminal notification:
//! the status is deleted after a successful upload, replaced with the
//! canceled text after an explicit cancellation, or replaced with the error
//! otherwise. Cleanup (token fired, worker joined, entry popped) happens on
//! every path before the next job is looked at.

use std::sync::Arc;

use renderq_core::messages;
use renderq_core::params::JobParams;
use renderq_core::types::TaskId;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::JobError;
use crate::job::{InputFile, JobEntry};
use crate::pipeline;
use crate::queue::{CurrentJob, RenderQueue};
use crate::runner::StageRunner;
use crate::status::StatusMessage;

/// A job taken from the front of the queue.
struct StartedJob {
    entry: Arc<JobEntry>,
    token: CancellationToken,
    /// Entries still waiting, with their new positions.
    pending: Vec<(usize, Arc<tokio::sync::Mutex<StatusMessage>>)>,
}

pub struct Processor {
    queue: Arc<RenderQueue>,
}

impl Processor {
    pub fn new(queue: Arc<RenderQueue>) -> Self {
        Self { queue }
    }

    /// Drain the queue until shutdown. Returns `Err` on a fatal error.
    pub async fn run(self) -> Result<(), JobError> {
        tracing::info!("Queue processor started");
        loop {
            if self.queue.shutdown.is_cancelled() {
                break;
            }
            match self.begin_next() {
                Some(job) => self.process(job).await?,
                None => {
                    tokio::select! {
                        _ = self.queue.wake.notified() => {}
                        _ = self.queue.shutdown.cancelled() => break,
                    }
                }
            }
        }
        tracing::info!("Queue processor stopped");
        Ok(())
    }

    /// Mark the front entry as current. Positions of the waiting entries
    /// are computed under the same lock.
    fn begin_next(&self) -> Option<StartedJob> {
        let mut st = self.queue.lock();
        let entry = st.entries.front()?.clone();

        let token = self.queue.shutdown.child_token();
        let canceled = std::mem::take(&mut st.cancel_front);
        if canceled {
            token.cancel();
        }
        st.current = Some(CurrentJob {
            task_id: entry.task_id,
            requester_id: entry.origin.requester_id,
            token: token.clone(),
            canceled,
            input_tx: None,
        });

        let pending = st
            .entries
            .iter()
            .enumerate()
            .skip(1)
            .map(|(position, e)| (position, e.status.clone()))
            .collect();

        Some(StartedJob {
            entry,
            token,
            pending,
        })
    }

    async fn process(&self, job: StartedJob) -> Result<(), JobError> {
        let StartedJob {
            entry,
            token,
            pending,
        } = job;

        for (position, status) in pending {
            status
                .lock()
                .await
                .update(&messages::queued_at(position))
                .await;
        }

        let task_id = entry.task_id;
        tracing::info!(
            %task_id,
            requester_id = entry.origin.requester_id,
            kind = ?entry.params.kind(),
            input = entry.params.original_input(),
            "Processing request",
        );

        let deadline = Instant::now() + self.queue.services.config.max_job_duration;
        let mut ctx = ExecutionContext::new(token, deadline);
        let mut status = entry.status.lock().await;

        let outcome = self.execute(&entry, &mut ctx, &mut status).await;
        let canceled = self.current_canceled();

        let fatal = match outcome {
            Ok(()) => {
                tracing::info!(%task_id, "Request finished");
                None
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(%task_id, error = %e, "Fatal error, stopping processor");
                Some(e)
            }
            Err(_) if canceled => {
                tracing::info!(%task_id, "Request canceled");
                if let Err(e) = self.queue.services.backend.interrupt().await {
                    tracing::warn!(%task_id, error = %e, "Can't interrupt backend");
                }
                status.finish(messages::CANCELED).await;
                None
            }
            Err(e) => {
                tracing::warn!(%task_id, error = %e, "Request failed");
                status.finish(&messages::error_text(&e)).await;
                None
            }
        };
        drop(status);

        ctx.shutdown().await;
        self.finish_current(task_id);

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn execute(
        &self,
        entry: &JobEntry,
        ctx: &mut ExecutionContext,
        status: &mut StatusMessage,
    ) -> Result<(), JobError> {
        let input = if entry.params.needs_input() {
            Some(self.wait_for_input(ctx, status).await?)
        } else {
            None
        };

        let mut runner = StageRunner {
            services: &self.queue.services,
            ctx,
            status,
            task_id: entry.task_id,
            group_chat: entry.origin.is_group(),
        };
        let messenger = self.queue.messenger.as_ref();

        match (&entry.params, input) {
            (JobParams::Render(params), _) => {
                pipeline::render(&mut runner, messenger, &entry.origin, params).await
            }
            (JobParams::Upscale(params), Some(input)) => {
                pipeline::upscale(&mut runner, messenger, params, input).await
            }
            (JobParams::Upscale(_), None) => Err(JobError::NoInputData),
        }
    }

    /// Prompt for the source image and wait for it, the job deadline, or
    /// the input timeout, whichever comes first.
    async fn wait_for_input(
        &self,
        ctx: &ExecutionContext,
        status: &mut StatusMessage,
    ) -> Result<InputFile, JobError> {
        status.update(messages::AWAITING_INPUT).await;

        let (input_tx, input_rx) = oneshot::channel();
        if let Some(current) = self.queue.lock().current.as_mut() {
            current.input_tx = Some(input_tx);
        }
        tracing::info!("Waiting for image file");

        let result = tokio::select! {
            received = input_rx => received.map_err(|_| JobError::NoInputData),
            _ = ctx.token().cancelled() => {
                // Deadline and explicit cancel both end the wait as canceled.
                if let Some(current) = self.queue.lock().current.as_mut() {
                    current.canceled = true;
                }
                Err(JobError::Canceled)
            }
            _ = tokio::time::sleep(self.queue.services.config.input_timeout) => {
                tracing::info!("Waiting for image file timed out");
                Err(JobError::InputTimeout)
            }
        };

        if let Some(current) = self.queue.lock().current.as_mut() {
            current.input_tx = None;
        }

        let file = result?;
        if file.data.is_empty() {
            return Err(JobError::NoInputData);
        }
        Ok(file)
    }

    fn current_canceled(&self) -> bool {
        self.queue
            .lock()
            .current
            .as_ref()
            .is_some_and(|c| c.canceled)
    }

    /// Pop the finished entry and clear the current-job bookkeeping.
    fn finish_current(&self, task_id: TaskId) {
        let mut st = self.queue.lock();
        match st.entries.front() {
            Some(front) if front.task_id == task_id => {
                st.entries.pop_front();
            }
            _ => tracing::error!(%task_id, "Finished entry is not at the front of the queue"),
        }
        st.current = None;
        st.cancel_front = false;
        if st.entries.is_empty() {
            tracing::info!("Finished queue processing");
        }
    }
}
