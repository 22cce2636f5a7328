//! Stage runner: one backend call with progress reporting and retry.
//!
//! The call itself executes in a worker task. While it runs, the caller
//! sits in a select-loop that
//!
//! 1. stops on job cancellation or deadline,
//! 2. refreshes the status message on the display ticker,
//! 3. samples backend progress on the faster poll ticker,
//! 4. returns when the worker reports its result.
//!
//! A failed call is classified: an unreachable backend is restarted
//! through the supervisor, a throttled one is waited out, and in both
//! cases the stage is retried exactly once. Anything else is final.

use std::sync::Arc;
use std::time::Duration;

use renderq_backend::backend::Images;
use renderq_backend::{BackendError, BackendSupervisor, RenderBackend};
use renderq_core::messages;
use renderq_core::params::{RenderParams, UpscaleParams};
use renderq_core::progress::{processing_text, ProgressRatchet};
use renderq_core::types::TaskId;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::context::ExecutionContext;
use crate::error::JobError;
use crate::status::StatusMessage;

/// Backend operation performed by one stage.
#[derive(Clone)]
pub(crate) enum StageOp {
    Render(RenderParams),
    Upscale(UpscaleParams, Arc<[u8]>),
}

impl StageOp {
    fn name(&self) -> &'static str {
        match self {
            StageOp::Render(_) => "render",
            StageOp::Upscale(..) => "upscale",
        }
    }

    async fn call(&self, backend: &dyn RenderBackend) -> Result<Images, BackendError> {
        match self {
            StageOp::Render(params) => backend.render(params).await,
            StageOp::Upscale(params, image) => backend.upscale(params, image).await,
        }
    }
}

/// Why a single attempt ended without images.
enum AttemptError {
    /// The job's token fired.
    Stopped,
    Backend(BackendError),
    /// The worker vanished without reporting.
    WorkerLost,
}

/// Collaborators shared by every stage of the running job.
#[derive(Clone)]
pub(crate) struct Services {
    pub backend: Arc<dyn RenderBackend>,
    pub supervisor: Option<Arc<dyn BackendSupervisor>>,
    pub config: QueueConfig,
}

pub(crate) struct StageRunner<'a> {
    pub services: &'a Services,
    pub ctx: &'a mut ExecutionContext,
    pub status: &'a mut StatusMessage,
    pub task_id: TaskId,
    pub group_chat: bool,
}

impl StageRunner<'_> {
    /// Run one stage to completion, retrying once on recoverable errors.
    pub async fn run_stage(&mut self, op: StageOp, summary: &str) -> Result<Images, JobError> {
        self.status
            .update(&format!("{}\n{}", messages::STARTING, summary))
            .await;
        tracing::info!(task_id = %self.task_id, stage = op.name(), "Stage started");

        let mut ratchet = ProgressRatchet::new();
        let mut retried = false;
        loop {
            let err = match self.attempt(&op, summary, &mut ratchet).await {
                Ok(images) => {
                    tracing::info!(
                        task_id = %self.task_id,
                        stage = op.name(),
                        images = images.len(),
                        "Stage finished",
                    );
                    return Ok(images);
                }
                Err(AttemptError::Stopped) => return Err(JobError::Timeout),
                Err(AttemptError::WorkerLost) => {
                    return Err(JobError::Internal("worker stopped without a result".into()))
                }
                Err(AttemptError::Backend(e)) => e,
            };

            tracing::warn!(task_id = %self.task_id, stage = op.name(), error = %err, "Stage failed");
            if retried {
                return Err(err.into());
            }

            if err.is_unreachable() {
                self.restart_backend().await?;
            } else if let Some(wait) = err.retry_after() {
                tracing::info!(task_id = %self.task_id, wait_secs = wait.as_secs(), "Backend rate limited, retrying");
                self.sleep_or_stop(wait).await?;
            } else {
                return Err(JobError::Backend(err.to_string()));
            }
            retried = true;
        }
    }

    /// Bring the backend back through the supervisor.
    async fn restart_backend(&mut self) -> Result<(), JobError> {
        let Some(supervisor) = self.services.supervisor.clone() else {
            return Err(JobError::BackendUnreachable(
                "Stable Diffusion is not running and start is disabled.".into(),
            ));
        };

        self.status.update(messages::BACKEND_RESTARTING).await;
        let token = self.ctx.token().clone();
        let result = tokio::select! {
            _ = token.cancelled() => return Err(JobError::Timeout),
            r = supervisor.ensure_running() => r,
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Backend start failed");
            self.status
                .finish(&format!("{}: {}", messages::BACKEND_START_FAILED, e))
                .await;
            return Err(JobError::BackendStartFailed(e.to_string()));
        }
        Ok(())
    }

    async fn sleep_or_stop(&self, wait: Duration) -> Result<(), JobError> {
        tokio::select! {
            _ = self.ctx.token().cancelled() => Err(JobError::Timeout),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// One backend call in a worker task, with the progress select-loop.
    async fn attempt(
        &mut self,
        op: &StageOp,
        summary: &str,
        ratchet: &mut ProgressRatchet,
    ) -> Result<Images, AttemptError> {
        let token = self.ctx.token().clone();
        let (result_tx, mut result_rx) = oneshot::channel();
        self.ctx
            .spawn_worker(worker(
                self.services.backend.clone(),
                op.clone(),
                token.clone(),
                result_tx,
            ))
            .await;

        let config = &self.services.config;
        let display_period = config.display_interval(self.group_chat);
        let mut display = interval_at(Instant::now() + display_period, display_period);
        display.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = interval_at(Instant::now() + config.poll_interval, config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => return Err(AttemptError::Stopped),

                result = &mut result_rx => {
                    self.ctx.join_worker().await;
                    return match result {
                        Ok(Ok(images)) => Ok(images),
                        Ok(Err(e)) => Err(AttemptError::Backend(e)),
                        Err(_) => Err(AttemptError::WorkerLost),
                    };
                }

                _ = display.tick() => {
                    self.status.update(&processing_text(ratchet, summary)).await;
                }

                _ = poll.tick() => {
                    match self.services.backend.progress().await {
                        Ok(sample) => {
                            if ratchet.observe(sample) {
                                tracing::debug!(
                                    task_id = %self.task_id,
                                    percent = ratchet.percent(),
                                    eta_secs = ratchet.eta().as_secs(),
                                    "Progress",
                                );
                            }
                        }
                        Err(e) => tracing::trace!(error = %e, "Progress query failed"),
                    }
                }
            }
        }
    }
}

/// Worker body: perform the call unless the job stops first.
async fn worker(
    backend: Arc<dyn RenderBackend>,
    op: StageOp,
    token: CancellationToken,
    result_tx: oneshot::Sender<Result<Images, BackendError>>,
) {
    let result = tokio::select! {
        _ = token.cancelled() => return,
        r = op.call(backend.as_ref()) => r,
    };
    // The receiver is gone only when the job already stopped.
    let _ = result_tx.send(result);
}
