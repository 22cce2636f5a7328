//! Delivery of finished images.

use std::time::Duration;

use renderq_backend::backend::Images;
use renderq_core::params::OutputFormat;
use renderq_core::transcode::png_to_jpeg;
use renderq_core::types::Origin;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::messenger::{Messenger, UploadItem};

/// Transport limit on caption length, in characters.
pub(crate) const MAX_CAPTION_CHARS: usize = 1024;

/// Shorten `caption` to the transport limit, marking the cut with `...`.
pub(crate) fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() <= MAX_CAPTION_CHARS {
        return caption.to_string();
    }
    let mut cut: String = caption.chars().take(MAX_CAPTION_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

/// Convert backend PNGs to the requested format.
pub(crate) async fn transcode(images: Images, format: OutputFormat) -> Result<Images, JobError> {
    if format.is_png() {
        return Ok(images);
    }
    tokio::task::spawn_blocking(move || {
        images
            .iter()
            .map(|img| png_to_jpeg(img))
            .collect::<Result<Images, _>>()
    })
    .await
    .map_err(|e| JobError::Internal(format!("transcode task failed: {e}")))?
    .map_err(JobError::from)
}

/// Build upload items; only the first carries the caption.
pub(crate) fn build_items(
    images: Images,
    caption: &str,
    filename: impl Fn(usize) -> String,
) -> Vec<UploadItem> {
    images
        .into_iter()
        .enumerate()
        .map(|(i, data)| UploadItem {
            filename: filename(i),
            data,
            caption: (i == 0).then(|| truncate_caption(caption)),
        })
        .collect()
}

/// Upload `items` as one group, retrying once when throttled.
pub(crate) async fn upload(
    messenger: &dyn Messenger,
    origin: &Origin,
    items: &[UploadItem],
    token: &CancellationToken,
) -> Result<(), JobError> {
    if items.is_empty() {
        return Err(JobError::Upload("nothing to upload".into()));
    }

    let err = match messenger.upload_images(origin, items).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    tracing::warn!(error = %err, "Image upload failed");

    let Some(wait) = err.retry_after() else {
        return Err(JobError::Upload(err.to_string()));
    };
    tracing::info!(wait_secs = wait.as_secs(), "Upload rate limited, retrying");
    sleep_or_stop(wait, token).await?;

    messenger
        .upload_images(origin, items)
        .await
        .map_err(|e| JobError::Upload(e.to_string()))
}

async fn sleep_or_stop(wait: Duration, token: &CancellationToken) -> Result<(), JobError> {
    tokio::select! {
        _ = token.cancelled() => Err(JobError::Timeout),
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}
