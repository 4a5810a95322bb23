//! QC/move pass (spec §4.1 step 4): background removal, local
//! post-processing (convert/enhance/trim), quality check, and the final
//! move into the output directory under `<imageMappingId>_<basename>`.
//!
//! Processing-stage failures (convert/enhancement/trim) are soft by
//! default here — unlike a retry's `runPostProcessing`, the initial run
//! has no `failOptions` override, so the image falls back to its source
//! path and stays alive rather than being marked `qc_failed` (spec §9).
//! Remove-background failures are governed by `RemoveBgFailureMode`
//! instead, since that policy is attached directly to `ProcessingSettings`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::domain::{GeneratedImage, QcStatus, RemoveBgFailureMode};
use crate::engine::state::LogLevel;
use crate::failure::QcReason;
use crate::providers::ProcessingInvocation;

use super::JobContext;

pub(super) fn run(ctx: &mut JobContext) -> Result<()> {
    let images = ctx.persistence().get_generated_images_by_execution(&ctx.execution.id)?;
    let pending: Vec<GeneratedImage> = images.into_iter().filter(|img| img.qc_status == QcStatus::Pending).collect();

    let snapshot = ctx.execution.configuration_snapshot.clone();
    let output_dir = snapshot.file_paths.output_directory.clone().unwrap_or_else(|| ".".to_string());
    fs::create_dir_all(&output_dir).ok();

    for mut image in pending {
        ctx.signal.check()?;
        ctx.persistence()
            .update_qc_status(&image.id, QcStatus::Processing, "")
            .ok();

        let Some(temp_path) = image.temp_image_path.clone() else {
            mark_failed(ctx, &image, QcReason::QcInputPathMissing);
            continue;
        };
        let source_path = PathBuf::from(&temp_path);

        let after_remove_bg = match apply_remove_background(ctx, &snapshot, &source_path) {
            RemoveBgStepOutcome::Path(path) => path,
            RemoveBgStepOutcome::HardFail => {
                mark_failed(ctx, &image, QcReason::for_stage(crate::failure::Stage::RemoveBg));
                continue;
            }
        };

        let processed_path = match apply_local_processing(ctx, &snapshot, &after_remove_bg, &image.image_mapping_id) {
            Ok(path) => path,
            Err(_) => after_remove_bg,
        };

        let qc_outcome = if snapshot.ai.run_quality_check {
            ctx.providers().vision.run_quality_check(
                &processed_path,
                &image.generation_prompt,
                snapshot.ai.quality_check_prompt.as_deref(),
                &snapshot.parameters.openai_model,
                &ctx.signal,
            )
        } else {
            Ok(crate::providers::QualityCheckOutcome { passed: true, reason: None })
        };

        match qc_outcome {
            Ok(outcome) if outcome.passed => {
                let final_path = move_into_output(&processed_path, &output_dir, &image.image_mapping_id);
                match final_path {
                    Ok(final_path) => {
                        image.final_image_path = Some(final_path.to_string_lossy().into_owned());
                        image.qc_status = QcStatus::Approved;
                        image.qc_reason = None;
                        ctx.persistence().update_generated_image(&image).ok();
                    }
                    Err(err) => {
                        ctx.log(LogLevel::Error, "qc_move", format!("failed to move final image: {err:#}"));
                        mark_failed(ctx, &image, QcReason::for_stage(crate::failure::Stage::SaveFinal));
                    }
                }
            }
            Ok(outcome) => {
                image.qc_status = QcStatus::QcFailed;
                image.qc_reason = outcome.reason.or_else(|| Some(QcReason::unclassified().to_string()));
                ctx.persistence().update_generated_image(&image).ok();
            }
            Err(err) => {
                ctx.log(LogLevel::Warn, "qc_move", format!("quality check call failed: {err:#}"));
                mark_failed(ctx, &image, QcReason::unclassified());
            }
        }
    }
    Ok(())
}

enum RemoveBgStepOutcome {
    Path(PathBuf),
    HardFail,
}

fn apply_remove_background(
    ctx: &JobContext,
    snapshot: &crate::domain::ConfigurationSnapshot,
    source: &Path,
) -> RemoveBgStepOutcome {
    if !snapshot.processing.remove_background {
        return RemoveBgStepOutcome::Path(source.to_path_buf());
    }
    let dest = source.with_extension("rembg.png");
    match ctx.providers().remove_bg.remove_background(source, &dest, &ctx.signal) {
        Ok(outcome) if outcome.applied => {
            RemoveBgStepOutcome::Path(outcome.output_path.unwrap_or_else(|| source.to_path_buf()))
        }
        Ok(_) => match snapshot.remove_bg_failure_mode {
            RemoveBgFailureMode::Approve => RemoveBgStepOutcome::Path(source.to_path_buf()),
            RemoveBgFailureMode::MarkFailed => RemoveBgStepOutcome::HardFail,
        },
        Err(err) => {
            ctx.log(LogLevel::Warn, "qc_move", format!("remove-background call failed: {err:#}"));
            match snapshot.remove_bg_failure_mode {
                RemoveBgFailureMode::Approve => RemoveBgStepOutcome::Path(source.to_path_buf()),
                RemoveBgFailureMode::MarkFailed => RemoveBgStepOutcome::HardFail,
            }
        }
    }
}

fn apply_local_processing(
    ctx: &JobContext,
    snapshot: &crate::domain::ConfigurationSnapshot,
    source: &Path,
    mapping_id: &str,
) -> Result<PathBuf, ()> {
    let temp_dir = snapshot
        .file_paths
        .temp_directory
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let invocation = ProcessingInvocation {
        convert: snapshot.processing.image_convert,
        target_format: snapshot.processing.convert_target_format.clone(),
        enhancement: snapshot.processing.enhancement_enabled,
        sharpening: snapshot.processing.enhancement_sharpening,
        saturation: snapshot.processing.enhancement_saturation,
        trim_transparent: snapshot.processing.trim_transparent,
        temp_dir,
    };
    ctx.providers()
        .processor
        .process_image(source, mapping_id, &invocation)
        .map_err(|err| {
            ctx.log(LogLevel::Warn, "qc_move", format!("post-processing failed, falling back to source: {err}"));
        })
}

fn move_into_output(source: &Path, output_dir: &str, mapping_id: &str) -> Result<PathBuf> {
    let basename = source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "image".to_string());
    let dest = Path::new(output_dir).join(format!("{mapping_id}_{basename}"));
    if fs::rename(source, &dest).is_err() {
        fs::copy(source, &dest)?;
        let _ = fs::remove_file(source);
    }
    Ok(dest)
}

fn mark_failed(ctx: &JobContext, image: &GeneratedImage, reason: QcReason) {
    ctx.persistence()
        .update_qc_status(&image.id, QcStatus::QcFailed, &reason.to_string())
        .ok();
}
