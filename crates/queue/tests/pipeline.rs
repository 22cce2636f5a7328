//! Render pipeline: stage chaining, progress display and delivery.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use renderq_core::messages;
use renderq_core::params::JobParams;
use renderq_core::types::{ChatKind, Origin};

/// Percentages shown in `🔨 Processing ... NN% ETA: ...` texts.
fn displayed_percents(texts: &[String]) -> Vec<u32> {
    texts
        .iter()
        .filter(|t| t.starts_with(messages::PROCESSING))
        .filter_map(|t| {
            let head = t.split(" ETA:").next()?;
            head.rsplit(' ').next()?.trim_end_matches('%').parse().ok()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Chaining
// ---------------------------------------------------------------------------

#[tokio::test]
async fn post_upscale_output_replaces_render_output() {
    let backend = FakeBackend::new();
    backend.push_render(Ok(vec![b"imgA".to_vec()]));
    backend.push_upscale(Ok(vec![b"imgB".to_vec()]));
    let messenger = FakeMessenger::new();
    let queue = queue_with(&backend, &messenger, None, fast_config());

    let mut params = render_params("castle");
    params.upscale.scale = 2.0;
    queue.add(JobParams::Render(params), Origin::direct(1)).await;
    let _processor = queue.start();

    wait_until(WAIT, || messenger.uploaded_by(1).is_some()).await;
    let upload = messenger.uploaded_by(1).unwrap();

    let data: Vec<_> = upload.items.iter().map(|i| i.data.clone()).collect();
    assert_eq!(data, vec![b"imgB".to_vec()], "upscale output must be delivered");
    assert_eq!(*backend.upscale_inputs.lock().unwrap(), vec![b"imgA".to_vec()]);
    assert!(messenger
        .texts(1)
        .contains(&format!("{}\n🔎 LDSRx2/PNG", messages::STARTING)));
}

#[tokio::test]
async fn high_res_disables_chained_upscale() {
    let backend = FakeBackend::new();
    let messenger = FakeMessenger::new();
    let queue = queue_with(&backend, &messenger, None, fast_config());

    let mut params = render_params("castle");
    params.num_outputs = 4;
    params.upscale.scale = 2.0;
    params.high_res.scale = 1.5;
    queue.add(JobParams::Render(params), Origin::direct(1)).await;
    let _processor = queue.start();

    wait_until(WAIT, || messenger.uploaded_by(1).is_some()).await;

    assert_eq!(backend.upscale_calls.load(Ordering::SeqCst), 0);
    let rendered = backend.rendered.lock().unwrap().clone();
    assert_eq!(rendered[0].upscale.scale, 0.0);
    assert_eq!(rendered[0].num_outputs, 1);
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn render_upload_is_captioned_and_named() {
    let backend = FakeBackend::new();
    backend.push_render(Ok(vec![b"one".to_vec(), b"two".to_vec()]));
    let messenger = FakeMessenger::new();
    let queue = queue_with(&backend, &messenger, None, fast_config());

    let params = render_params("a red fox");
    let summary = params.summary();
    let ticket = queue.add(JobParams::Render(params), Origin::direct(1)).await;
    let _processor = queue.start();

    wait_until(WAIT, || messenger.status_deleted(1)).await;
    let upload = messenger.uploaded_by(1).unwrap();

    assert_eq!(upload.items.len(), 2);
    assert_eq!(
        upload.items[0].caption.as_deref(),
        Some(format!("a red fox\n{summary}").as_str())
    );
    assert_eq!(upload.items[1].caption, None);
    assert_eq!(
        upload.items[1].filename,
        format!("sd-image-7-{}-1.png", ticket.task_id)
    );
    assert!(messenger
        .texts(1)
        .contains(&format!("{}\n{}", messages::UPLOADING, summary)));
}

#[tokio::test]
async fn long_caption_is_truncated() {
    let backend = FakeBackend::new();
    let messenger = FakeMessenger::new();
    let queue = queue_with(&backend, &messenger, None, fast_config());

    let mut params = render_params("p");
    params.original_input = "x".repeat(2000);
    queue.add(JobParams::Render(params), Origin::direct(1)).await;
    let _processor = queue.start();

    wait_until(WAIT, || messenger.uploaded_by(1).is_some()).await;
    let caption = messenger.uploaded_by(1).unwrap().items[0]
        .caption
        .clone()
        .unwrap();
    assert_eq!(caption.chars().count(), 1024);
    assert!(caption.ends_with("..."));
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn displayed_progress_never_regresses() {
    let backend = FakeBackend::new();
    *backend.render_delay.lock().unwrap() = Duration::from_millis(150);
    backend
        .progress_samples
        .lock()
        .unwrap()
        .extend([10, 40, 25, 60, 30, 80]);
    let messenger = FakeMessenger::new();
    let queue = queue_with(&backend, &messenger, None, fast_config());

    queue.add(render_job("slow"), Origin::direct(1)).await;
    let _processor = queue.start();
    wait_until(WAIT, || messenger.status_deleted(1)).await;

    let percents = displayed_percents(&messenger.texts(1));
    assert!(!percents.is_empty(), "no progress was displayed");
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "progress regressed: {percents:?}"
    );
    assert_eq!(percents.last(), Some(&80));
}

#[tokio::test]
async fn group_chats_refresh_less_often() {
    let backend = FakeBackend::new();
    *backend.render_delay.lock().unwrap() = Duration::from_millis(120);
    backend
        .progress_samples
        .lock()
        .unwrap()
        .extend(1..=100);
    let messenger = FakeMessenger::new();
    let mut config = fast_config();
    config.direct_display_interval = Duration::from_millis(5);
    config.group_display_interval = Duration::from_secs(60);
    let queue = queue_with(&backend, &messenger, None, config);

    let group = Origin {
        chat_kind: ChatKind::Group,
        chat_id: -100,
        ..Origin::direct(2)
    };
    queue.add(render_job("group"), group).await;
    let _processor = queue.start();
    wait_until(WAIT, || messenger.status_deleted(2)).await;

    assert!(displayed_percents(&messenger.texts(2)).is_empty());
}
