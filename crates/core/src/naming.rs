//! Attachment naming for uploaded images.
//!
//! Names embed the job's task id and the item index so repeated uploads
//! for the same job, or uploads of different jobs, never collide.

use crate::params::OutputFormat;
use crate::types::TaskId;

/// Filename of the `index`-th image produced by a render.
///
/// # Examples
///
/// ```
/// use renderq_core::naming::render_filename;
/// use renderq_core::params::OutputFormat;
/// use renderq_core::types::TaskId;
///
/// assert_eq!(
///     render_filename(42, TaskId::new(7), 0, OutputFormat::Jpeg),
///     "sd-image-42-7-0.jpg"
/// );
/// ```
pub fn render_filename(seed: u32, task_id: TaskId, index: usize, format: OutputFormat) -> String {
    format!("sd-image-{seed}-{task_id}-{index}.{}", format.extension())
}

/// Filename of the `index`-th image produced by upscaling `source`.
///
/// The extension of the uploaded source is replaced; a source without a
/// usable name falls back to `image`.
///
/// # Examples
///
/// ```
/// use renderq_core::naming::upscale_filename;
/// use renderq_core::params::OutputFormat;
/// use renderq_core::types::TaskId;
///
/// assert_eq!(
///     upscale_filename("cat.webp", TaskId::new(7), 0, OutputFormat::Png),
///     "cat-upscaled-7-0.png"
/// );
/// ```
pub fn upscale_filename(
    source: &str,
    task_id: TaskId,
    index: usize,
    format: OutputFormat,
) -> String {
    format!(
        "{}-upscaled-{task_id}-{index}.{}",
        file_stem(source),
        format.extension()
    )
}

/// Name of `filename` without directory and without its last extension.
pub fn file_stem(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    };
    if stem.is_empty() {
        "image"
    } else {
        stem
    }
}
