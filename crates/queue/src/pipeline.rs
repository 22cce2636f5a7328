//! Render and upscale pipelines.
//!
//! A render runs one backend stage, optionally followed by a chained
//! upscale of its first image. The images that get delivered are always
//! the last stage's output.

use std::sync::Arc;

use renderq_core::messages;
use renderq_core::naming::{render_filename, upscale_filename};
use renderq_core::params::{RenderParams, UpscaleParams};
use renderq_core::types::Origin;

use crate::error::JobError;
use crate::job::InputFile;
use crate::messenger::Messenger;
use crate::runner::{StageOp, StageRunner};
use crate::upload;

/// Render, optionally chain an upscale, then deliver to `origin`.
pub(crate) async fn render(
    runner: &mut StageRunner<'_>,
    messenger: &dyn Messenger,
    origin: &Origin,
    params: &RenderParams,
) -> Result<(), JobError> {
    let mut params = params.clone();
    params.normalize();
    let summary = params.summary();

    let mut images = runner
        .run_stage(StageOp::Render(params.clone()), &summary)
        .await?;

    if params.wants_post_upscale() {
        let upscale = params.post_upscale_params();
        let first = images
            .into_iter()
            .next()
            .ok_or_else(|| JobError::Backend("backend returned no images".into()))?;
        images = runner
            .run_stage(
                StageOp::Upscale(upscale.clone(), Arc::from(first)),
                &upscale.summary(),
            )
            .await?;
    }

    let images = upload::transcode(images, params.output).await?;
    runner
        .status
        .update(&format!("{}\n{}", messages::UPLOADING, summary))
        .await;

    let caption = format!("{}\n{}", params.original_input, summary);
    let task_id = runner.task_id;
    let items = upload::build_items(images, &caption, |i| {
        render_filename(params.seed, task_id, i, params.output)
    });
    upload::upload(messenger, origin, &items, runner.ctx.token()).await?;

    runner.status.delete().await;
    Ok(())
}

/// Upscale the requester's image, then deliver to the file's origin.
pub(crate) async fn upscale(
    runner: &mut StageRunner<'_>,
    messenger: &dyn Messenger,
    params: &UpscaleParams,
    input: InputFile,
) -> Result<(), JobError> {
    let summary = params.summary();
    let images = runner
        .run_stage(
            StageOp::Upscale(params.clone(), Arc::from(input.data)),
            &summary,
        )
        .await?;

    let images = upload::transcode(images, params.output).await?;
    runner
        .status
        .update(&format!("{}\n{}", messages::UPLOADING, summary))
        .await;

    let task_id = runner.task_id;
    let items = upload::build_items(images, &summary, |i| {
        upscale_filename(&input.filename, task_id, i, params.output)
    });
    upload::upload(messenger, &input.origin, &items, runner.ctx.token()).await?;

    runner.status.delete().await;
    Ok(())
}
