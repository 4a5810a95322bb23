//! Metadata pass (spec §4.1 step 3): regenerate title/description/tags for
//! every freshly-generated image via the vision provider, when the
//! configuration has `ai.run_metadata_gen` enabled. Runs before the QC/move
//! pass decides approve/fail, so it visits every `Pending` image rather
//! than only the ones that go on to pass QC. Per-image failures are
//! collected and raised together as one aggregate error, rather than
//! aborting the loop on the first failure — the pass must still visit
//! every pending image.

use anyhow::{anyhow, Result};

use crate::domain::{GeneratedImage, ImageFailure, QcStatus};
use crate::engine::state::LogLevel;
use crate::failure::{QcReason, Stage};

use super::JobContext;

pub(super) fn run(ctx: &mut JobContext) -> Result<()> {
    let snapshot = ctx.execution.configuration_snapshot.clone();
    if !snapshot.ai.run_metadata_gen {
        return Ok(());
    }

    let images = ctx.persistence().get_generated_images_by_execution(&ctx.execution.id)?;
    let pending: Vec<_> = images.into_iter().filter(|img| img.qc_status == QcStatus::Pending).collect();

    let mut failures = Vec::new();
    for mut image in pending {
        ctx.signal.check()?;
        let Some(source_path) = image.temp_image_path.clone() else {
            mark_metadata_failure(ctx, &mut image, "missing generated image path".to_string());
            failures.push(format!("{}: missing generated image path", image.id));
            continue;
        };

        let outcome = ctx.providers().vision.generate_metadata(
            std::path::Path::new(&source_path),
            &image.generation_prompt,
            snapshot.ai.metadata_prompt.as_deref(),
            &snapshot.parameters.openai_model,
            &ctx.signal,
        );

        match outcome {
            Ok(metadata) => {
                image.metadata.title = Some(metadata.title);
                image.metadata.description = Some(metadata.description);
                image.metadata.upload_tags = Some(metadata.upload_tags);
                if let Err(err) = ctx.persistence().update_metadata_by_id(&image.id, image.metadata.clone()) {
                    failures.push(format!("{}: failed to persist metadata: {err:#}", image.id));
                }
            }
            Err(err) => {
                ctx.log(LogLevel::Warn, "metadata", format!("metadata generation failed for {}: {err:#}", image.id));
                mark_metadata_failure(ctx, &mut image, err.to_string());
                failures.push(format!("{}: {err:#}", image.id));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("metadata generation failed for {} image(s): {}", failures.len(), failures.join("; ")))
    }
}

/// Marks `image` `qc_failed` with `processing_failed:metadata` (spec §7:
/// this reason is always assigned in the QC/metadata pass, never left
/// unrecorded) and records the raw failure under `metadata.failure`.
fn mark_metadata_failure(ctx: &JobContext, image: &mut GeneratedImage, message: String) {
    image.metadata.failure = Some(ImageFailure {
        stage: Some("metadata".to_string()),
        message: Some(message),
    });
    image.qc_status = QcStatus::QcFailed;
    image.qc_reason = Some(QcReason::for_stage(Stage::Metadata).to_string());
    if let Err(err) = ctx.persistence().update_generated_image(image) {
        ctx.log(LogLevel::Error, "metadata", format!("failed to persist metadata failure for {}: {err:#}", image.id));
    }
}
