//! Per-job execution context.
//!
//! Owned by the processor for the duration of one job. Bundles the job's
//! cancellation token, its deadline timer and the handle of the worker task
//! currently executing a backend call. The worker is always joined before
//! the context is dropped.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) struct ExecutionContext {
    token: CancellationToken,
    deadline_timer: JoinHandle<()>,
    worker: Option<JoinHandle<()>>,
}

impl ExecutionContext {
    /// Start a context whose token fires at `deadline` unless canceled
    /// earlier.
    pub fn new(token: CancellationToken, deadline: Instant) -> Self {
        let timer_token = token.clone();
        let deadline_timer = tokio::spawn(async move {
            tokio::select! {
                _ = timer_token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!("Job deadline reached");
                    timer_token.cancel();
                }
            }
        });
        Self {
            token,
            deadline_timer,
            worker: None,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawn the worker for one backend call. A previous worker must have
    /// been joined.
    pub async fn spawn_worker<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.join_worker().await;
        self.worker = Some(tokio::spawn(fut));
    }

    /// Wait for the current worker to stop.
    pub async fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
    }

    /// Fire the token and wait for every task of this job to stop.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        self.join_worker().await;
        if let Err(e) = (&mut self.deadline_timer).await {
            tracing::error!(error = %e, "Deadline timer failed");
        }
    }
}
