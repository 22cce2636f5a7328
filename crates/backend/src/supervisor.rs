//! Stable Diffusion WebUI process supervisor.
//!
//! Launches `<webui script> --api` in the script's directory when the API
//! does not answer, then pings the progress endpoint until it does or the
//! start timeout elapses. A child we spawned earlier and that is still
//! alive (for example, still loading models) is reused instead of being
//! launched a second time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::backend::{BackendSupervisor, RenderBackend};
use crate::error::{BackendError, SupervisorError};

/// How long the WebUI gets to bring its API up.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between two API pings while waiting for startup.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(500);

/// Result of a single API ping.
enum Ping {
    Up,
    Down,
}

/// Starts and health-checks the WebUI process.
pub struct ProcessSupervisor {
    backend: Arc<dyn RenderBackend>,
    script: PathBuf,
    child: Mutex<Option<Child>>,
    start_timeout: Duration,
    ping_interval: Duration,
}

impl ProcessSupervisor {
    /// * `backend` - client used to ping the API.
    /// * `script` - WebUI launch script, e.g. `/opt/sd/webui.sh`.
    pub fn new(backend: Arc<dyn RenderBackend>, script: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            script: script.into(),
            child: Mutex::new(None),
            start_timeout: DEFAULT_START_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }

    /// Override the startup timing.
    pub fn with_timing(mut self, ping_interval: Duration, start_timeout: Duration) -> Self {
        self.ping_interval = ping_interval;
        self.start_timeout = start_timeout;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    async fn ping(&self) -> Result<Ping, SupervisorError> {
        match self.backend.progress().await {
            Ok(_) => Ok(Ping::Up),
            Err(BackendError::Unreachable(_)) => Ok(Ping::Down),
            Err(e) if e.is_not_found() => Err(SupervisorError::ApiDisabled),
            Err(e) => Err(SupervisorError::Ping(e)),
        }
    }

    /// Spawn the launch script unless a child we started is still alive.
    async fn spawn_if_needed(&self) -> Result<(), SupervisorError> {
        let mut child = self.child.lock().await;

        if let Some(running) = child.as_mut() {
            match running.try_wait() {
                Ok(None) => {
                    tracing::info!(pid = ?running.id(), "Stable Diffusion process still starting");
                    return Ok(());
                }
                Ok(Some(status)) => {
                    tracing::warn!(%status, "Previous Stable Diffusion process exited");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not poll previous Stable Diffusion process");
                }
            }
        }

        let dir = self
            .script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        tracing::info!(script = %self.script.display(), "Starting Stable Diffusion");
        let spawned = Command::new(&self.script)
            .arg("--api")
            .current_dir(dir)
            .spawn()
            .map_err(SupervisorError::Spawn)?;
        *child = Some(spawned);
        Ok(())
    }
}

#[async_trait]
impl BackendSupervisor for ProcessSupervisor {
    async fn ensure_running(&self) -> Result<(), SupervisorError> {
        if let Ping::Up = self.ping().await? {
            tracing::debug!("Stable Diffusion is already running");
            return Ok(());
        }

        self.spawn_if_needed().await?;

        tracing::info!("Checking Stable Diffusion API");
        let started_at = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(self.ping_interval).await;

            if let Ping::Up = self.ping().await? {
                tracing::info!(
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Stable Diffusion API is up"
                );
                return Ok(());
            }

            if started_at.elapsed() > self.start_timeout {
                return Err(SupervisorError::StartTimeout(self.start_timeout));
            }
            tracing::debug!("Stable Diffusion API not answering yet");
        }
    }
}
