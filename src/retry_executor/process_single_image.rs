//! `processSingleImage` (spec §4.2): the seven-step contract a single
//! retry job goes through — fetch the image row, resolve which processing
//! settings apply, rerun post-processing, move into place, optionally
//! regenerate metadata, and persist the outcome.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::domain::{
    AiSettings, ConfigurationSnapshot, FilePaths, GeneratedImage, Parameters, ProcessingSettings, QcStatus,
    RemoveBgFailureMode, RetryJobRequest,
};
use crate::engine::cancellation::AbortSignal;
use crate::failure::QcReason;
use crate::persistence::PersistenceFacade;
use crate::providers::ProcessingInvocation;

use super::post_processing::{move_into_output, run_post_processing};
use super::RetryDeps;

/// Step 2: resolve the configuration snapshot that originally produced
/// `image`. The execution row's immutable snapshot is the source of
/// truth; if the execution row is gone (or unreadable), fall back to a
/// `"fallback"` snapshot built from system defaults rather than failing
/// the retry outright.
fn get_original_job_configuration(persistence: &dyn PersistenceFacade, image: &GeneratedImage) -> ConfigurationSnapshot {
    match persistence.get_job_execution(&image.execution_id) {
        Ok(Some(execution)) => execution.configuration_snapshot,
        _ => fallback_configuration_snapshot(),
    }
}

fn fallback_configuration_snapshot() -> ConfigurationSnapshot {
    ConfigurationSnapshot {
        configuration_id: "fallback".to_string(),
        name: "fallback".to_string(),
        file_paths: FilePaths::default(),
        parameters: Parameters::default(),
        processing: ProcessingSettings::default(),
        ai: AiSettings::default(),
        runware_advanced_enabled: false,
        remove_bg_failure_mode: RemoveBgFailureMode::default(),
    }
}

fn invocation_from_processing(processing: &ProcessingSettings, temp_dir: PathBuf) -> ProcessingInvocation {
    ProcessingInvocation {
        convert: processing.image_convert,
        target_format: processing.convert_target_format.clone(),
        enhancement: processing.enhancement_enabled,
        sharpening: processing.enhancement_sharpening,
        saturation: processing.enhancement_saturation,
        trim_transparent: processing.trim_transparent,
        temp_dir,
    }
}

/// Merges a retry's `modified_settings` JSON patch onto the original
/// configuration's processing settings, so a retry that only overrides
/// `enhancementSharpening` still carries the original `convertTargetFormat`.
fn merge_modified_settings(base: &ProcessingSettings, patch: &serde_json::Value) -> ProcessingSettings {
    let Ok(mut merged) = serde_json::to_value(base) else {
        return base.clone();
    };
    if let (Some(merged_obj), Some(patch_obj)) = (merged.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            merged_obj.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(merged).unwrap_or_else(|_| base.clone())
}

pub(super) fn process(deps: &RetryDeps, request: &RetryJobRequest, signal: &AbortSignal) -> Result<()> {
    signal.check()?;

    // Step 1: fetch the image row.
    let mut image = deps
        .persistence
        .get_generated_image(&request.image_id)?
        .ok_or_else(|| anyhow!("no generated image found for id {}", request.image_id))?;

    deps.persistence.update_qc_status(&image.id, QcStatus::RetryPending, "").ok();

    let source_path = match image
        .final_image_path
        .clone()
        .or_else(|| image.temp_image_path.clone())
        .filter(|path| std::path::Path::new(path).exists())
    {
        Some(path) => path,
        None => {
            fail_retry(deps, &mut image, QcReason::QcInputPathMissing);
            return Ok(());
        }
    };

    // Step 2/3: resolve which processing settings and directories apply.
    let snapshot = get_original_job_configuration(deps.persistence.as_ref(), &image);
    let processing = match (&request.modified_settings, request.use_original_settings) {
        (Some(patch), false) => merge_modified_settings(&snapshot.processing, patch),
        _ => snapshot.processing.clone(),
    };
    let temp_dir = snapshot.file_paths.temp_directory.clone().map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
    let output_dir = snapshot.file_paths.output_directory.clone().unwrap_or_else(|| ".".to_string());
    let invocation = invocation_from_processing(&processing, temp_dir);

    // Step 4/5: rerun post-processing, then move into the output directory,
    // both subject to the same soft/hard resolution.
    let processed = match run_post_processing(
        deps.processor.as_ref(),
        std::path::Path::new(&source_path),
        &image.image_mapping_id,
        &invocation,
        &request.fail_options,
    ) {
        Ok(outcome) => outcome,
        Err(reason) => {
            fail_retry(deps, &mut image, reason);
            return Ok(());
        }
    };

    let final_path = match move_into_output(&processed.path, &output_dir, &image.image_mapping_id, &request.fail_options) {
        Ok(path) => path,
        Err(reason) => {
            fail_retry(deps, &mut image, reason);
            return Ok(());
        }
    };

    // Step 6: optional metadata regeneration.
    if request.include_metadata {
        signal.check()?;
        match deps.vision.generate_metadata(
            &final_path,
            &image.generation_prompt,
            snapshot.ai.metadata_prompt.as_deref(),
            &snapshot.parameters.openai_model,
            signal,
        ) {
            Ok(metadata) => {
                image.metadata.title = Some(metadata.title);
                image.metadata.description = Some(metadata.description);
                image.metadata.upload_tags = Some(metadata.upload_tags);
            }
            Err(err) => {
                image.metadata.failure = Some(crate::domain::ImageFailure {
                    stage: Some("metadata".to_string()),
                    message: Some(err.to_string()),
                });
            }
        }
    }

    // Step 7: persist the settled row. Modified settings are transient —
    // they steer this retry's processing but never overwrite the row's
    // persisted `processing_settings` (spec §4.2 step 4, §8).
    image.final_image_path = Some(final_path.to_string_lossy().into_owned());
    image.qc_status = QcStatus::Approved;
    image.qc_reason = None;
    deps.persistence.update_generated_image(&image)?;
    Ok(())
}

fn fail_retry(deps: &RetryDeps, image: &mut GeneratedImage, reason: QcReason) {
    image.qc_status = QcStatus::RetryFailed;
    image.qc_reason = Some(reason.to_string());
    deps.persistence
        .update_qc_status(&image.id, QcStatus::RetryFailed, &reason.to_string())
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unpatched_fields_from_base() {
        let base = ProcessingSettings {
            convert_target_format: "png".to_string(),
            enhancement_sharpening: 0.2,
            ..Default::default()
        };
        let patch = serde_json::json!({ "enhancementSharpening": 0.8 });
        let merged = merge_modified_settings(&base, &patch);
        assert_eq!(merged.convert_target_format, "png");
        assert_eq!(merged.enhancement_sharpening, 0.8);
    }
}
