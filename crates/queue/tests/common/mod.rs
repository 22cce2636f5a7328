//! In-memory fakes of the queue's collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use renderq_backend::backend::Images;
use renderq_backend::{BackendError, BackendSupervisor, RenderBackend, SupervisorError};
use renderq_core::params::{
    HighResParams, JobParams, OutputFormat, PostUpscale, RenderParams, UpscaleParams,
};
use renderq_core::progress::Progress;
use renderq_core::types::{DbId, Origin};
use renderq_queue::{
    Messenger, MessengerError, NotificationRef, QueueConfig, RenderQueue, UploadItem,
};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBackend {
    /// Scripted render results, consumed in order. Empty means success.
    pub render_results: Mutex<VecDeque<Result<Images, BackendError>>>,
    pub upscale_results: Mutex<VecDeque<Result<Images, BackendError>>>,
    /// Progress percentages, consumed in order; the last one repeats.
    pub progress_samples: Mutex<VecDeque<i32>>,
    /// Number of upcoming renders that block until the job stops.
    pub hold_renders: AtomicUsize,
    /// Time each render takes.
    pub render_delay: Mutex<Duration>,

    pub render_calls: AtomicUsize,
    pub upscale_calls: AtomicUsize,
    pub interrupt_calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub rendered: Mutex<Vec<RenderParams>>,
    pub upscale_inputs: Mutex<Vec<Vec<u8>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_render(&self, result: Result<Images, BackendError>) {
        self.render_results.lock().unwrap().push_back(result);
    }

    pub fn push_upscale(&self, result: Result<Images, BackendError>) {
        self.upscale_results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    async fn busy<T>(&self, fut: impl Future<Output = T>) -> T {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        // Held renders are dropped mid-await when the job stops.
        let _guard = ActiveGuard(&self.active);
        fut.await
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn render(&self, params: &RenderParams) -> Result<Images, BackendError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        self.rendered.lock().unwrap().push(params.clone());

        let hold = self
            .hold_renders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let delay = *self.render_delay.lock().unwrap();

        self.busy(async {
            if hold {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(delay).await;
        })
        .await;

        self.render_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![b"render".to_vec()]))
    }

    async fn upscale(&self, _: &UpscaleParams, image: &[u8]) -> Result<Images, BackendError> {
        self.upscale_calls.fetch_add(1, Ordering::SeqCst);
        self.upscale_inputs.lock().unwrap().push(image.to_vec());
        self.busy(async {}).await;
        self.upscale_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![b"upscaled".to_vec()]))
    }

    async fn progress(&self) -> Result<Progress, BackendError> {
        let mut samples = self.progress_samples.lock().unwrap();
        let percent = if samples.len() > 1 {
            samples.pop_front().unwrap_or_default()
        } else {
            samples.front().copied().unwrap_or_default()
        };
        Ok(Progress {
            percent,
            eta: Duration::from_secs(1),
        })
    }

    async fn interrupt(&self) -> Result<(), BackendError> {
        self.interrupt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct FakeSupervisor {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSupervisor {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BackendSupervisor for FakeSupervisor {
    async fn ensure_running(&self) -> Result<(), SupervisorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SupervisorError::StartTimeout(Duration::from_secs(30)))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Upload {
    pub origin: Origin,
    pub items: Vec<UploadItem>,
    pub at: Instant,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: AtomicI64,
    /// Message id -> requester.
    owners: Mutex<HashMap<DbId, DbId>>,
    /// (requester, text) for every send and edit, in order.
    texts: Mutex<Vec<(DbId, String)>>,
    deleted: Mutex<Vec<DbId>>,
    released: Mutex<Vec<DbId>>,
    pub upload_results: Mutex<VecDeque<Result<(), MessengerError>>>,
    pub uploads: Mutex<Vec<Upload>>,
    pub upload_attempts: Mutex<Vec<Instant>>,
}

impl FakeMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every status text shown to `requester`, in order.
    pub fn texts(&self, requester: DbId) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == requester)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn last_text(&self, requester: DbId) -> Option<String> {
        self.texts(requester).pop()
    }

    pub fn all_texts(&self) -> usize {
        self.texts.lock().unwrap().len()
    }

    /// Whether `requester`'s status message was deleted.
    pub fn status_deleted(&self, requester: DbId) -> bool {
        self.deleted.lock().unwrap().contains(&requester)
    }

    /// Whether `requester`'s status message was marked final.
    pub fn status_released(&self, requester: DbId) -> bool {
        self.released.lock().unwrap().contains(&requester)
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_by(&self, requester: DbId) -> Option<Upload> {
        self.uploads()
            .into_iter()
            .find(|u| u.origin.requester_id == requester)
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_reply(&self, origin: &Origin, text: &str) -> Result<NotificationRef, MessengerError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.owners
            .lock()
            .unwrap()
            .insert(message_id, origin.requester_id);
        self.texts
            .lock()
            .unwrap()
            .push((origin.requester_id, text.to_string()));
        Ok(NotificationRef {
            chat_id: origin.chat_id,
            message_id,
        })
    }

    async fn edit_reply(&self, notification: &NotificationRef, text: &str) -> Result<(), MessengerError> {
        let owner = self.owners.lock().unwrap()[&notification.message_id];
        self.texts.lock().unwrap().push((owner, text.to_string()));
        Ok(())
    }

    async fn delete_reply(&self, notification: &NotificationRef) -> Result<(), MessengerError> {
        let owner = self.owners.lock().unwrap()[&notification.message_id];
        self.deleted.lock().unwrap().push(owner);
        Ok(())
    }

    async fn release_reply(&self, notification: &NotificationRef) {
        let owner = self.owners.lock().unwrap()[&notification.message_id];
        self.released.lock().unwrap().push(owner);
    }

    async fn upload_images(&self, origin: &Origin, items: &[UploadItem]) -> Result<(), MessengerError> {
        self.upload_attempts.lock().unwrap().push(Instant::now());
        if let Some(result) = self.upload_results.lock().unwrap().pop_front() {
            result?;
        }
        self.uploads.lock().unwrap().push(Upload {
            origin: origin.clone(),
            items: items.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Millisecond-scale timing so tests finish quickly.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        max_job_duration: Duration::from_secs(10),
        input_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(2),
        direct_display_interval: Duration::from_millis(5),
        group_display_interval: Duration::from_millis(15),
    }
}

pub fn queue_with(
    backend: &Arc<FakeBackend>,
    messenger: &Arc<FakeMessenger>,
    supervisor: Option<Arc<FakeSupervisor>>,
    config: QueueConfig,
) -> Arc<RenderQueue> {
    RenderQueue::new(
        backend.clone(),
        messenger.clone(),
        supervisor.map(|s| s as Arc<dyn BackendSupervisor>),
        config,
    )
}

pub fn render_params(prompt: &str) -> RenderParams {
    RenderParams {
        original_input: prompt.to_string(),
        prompt: prompt.to_string(),
        negative_prompt: String::new(),
        seed: 7,
        width: 512,
        height: 512,
        steps: 20,
        num_outputs: 1,
        cfg_scale: 7.0,
        sampler: "Euler a".into(),
        model: "v1-5".into(),
        output: OutputFormat::Png,
        upscale: PostUpscale::default(),
        high_res: HighResParams::default(),
    }
}

pub fn render_job(prompt: &str) -> JobParams {
    JobParams::Render(render_params(prompt))
}

pub fn upscale_job() -> JobParams {
    JobParams::Upscale(UpscaleParams {
        original_input: "/upscale".into(),
        output: OutputFormat::Png,
        ..Default::default()
    })
}

/// Poll `cond` until it holds; panics after `timeout`.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let started = Instant::now();
    while !cond() {
        assert!(started.elapsed() < timeout, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub const WAIT: Duration = Duration::from_secs(5);
