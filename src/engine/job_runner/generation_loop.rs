//! Generation loop: for each requested generation, resolve a keyword row,
//! synthesize generation parameters, call the image provider with
//! retry/backoff, and persist one `GeneratedImage` row per produced or
//! failed item (spec §4.1 step 2, §4.5).

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::domain::{GeneratedImage, ImageMetadata, QcStatus};
use crate::engine::cancellation::with_timeout;
use crate::engine::state::LogLevel;
use crate::failure::QcReason;
use crate::paramgen;

use super::JobContext;

pub(super) fn run(ctx: &mut JobContext) -> Result<()> {
    let snapshot = ctx.execution.configuration_snapshot.clone();
    let params = &snapshot.parameters;

    let keyword_rows = match snapshot.file_paths.keyword_file.as_deref() {
        Some(path) => paramgen::load_keywords(Path::new(path)).unwrap_or_else(|err| {
            ctx.log(LogLevel::Warn, "generation", format!("failed to read keyword file: {err:#}"));
            Vec::new()
        }),
        None => Vec::new(),
    };
    let system_prompt = paramgen::read_prompt_file_lenient(snapshot.file_paths.system_prompt_file.as_deref());

    let variations = paramgen::clamp_variations(params.variations, params.count.max(1));
    let mut any_hard_error: Option<anyhow::Error> = None;
    let mut total_images = 0u32;

    for generation_index in 0..params.count {
        ctx.signal.check()?;

        let keyword = paramgen::select_keyword(&keyword_rows, generation_index as usize, params.keyword_random)
            .unwrap_or(Value::Null);

        let generated = match paramgen::generate_parameters_for_row(
            ctx.providers().vision.as_ref(),
            &keyword,
            params,
            system_prompt.as_deref(),
            snapshot.file_paths.keyword_file.as_deref(),
            &ctx.signal,
        ) {
            Ok(generated) => generated,
            Err(err) => {
                ctx.log(LogLevel::Error, "generation", format!("parameter generation failed: {err:#}"));
                any_hard_error.get_or_insert(err);
                continue;
            }
        };

        let result = call_provider_with_retry(ctx, &generated, &params.dimension_csv, variations);
        match result {
            Ok(provider_result) => {
                let (produced, failed) = provider_result.into_parts();
                for item in &produced {
                    total_images += 1;
                    persist_pending_image(ctx, &generated.prompt, item);
                }
                for failure in &failed {
                    total_images += 1;
                    persist_failed_item(ctx, &generated.prompt, failure);
                }
            }
            Err(err) => {
                ctx.log(LogLevel::Error, "generation", format!("image generation failed: {err:#}"));
                any_hard_error.get_or_insert(err);
            }
        }
    }

    if total_images > 0 {
        let _ = ctx.persistence().update_job_execution_statistics(&ctx.execution.id, 0, 0, total_images);
    }

    match any_hard_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn call_provider_with_retry(
    ctx: &JobContext,
    generated: &crate::providers::GenerationParameters,
    dimension_csv: &str,
    variations: u32,
) -> Result<crate::providers::ImageProviderResult> {
    let snapshot = &ctx.execution.configuration_snapshot;
    let attempts = snapshot.parameters.generation_retry_attempts + 1;
    let backoff_ms = snapshot.parameters.generation_retry_backoff_ms;
    let timeout_ms = if snapshot.parameters.polling_timeout_enabled {
        snapshot.parameters.polling_timeout_ms as i64
    } else {
        0
    };

    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..attempts {
        ctx.signal.check()?;
        let image = ctx.providers().image.clone();
        let params_owned = generated.clone();
        let dimension_csv_owned = dimension_csv.to_string();
        let signal_owned = ctx.signal.clone();

        let outcome = with_timeout(timeout_ms, "image-generation", move || {
            image.generate(&params_owned, &dimension_csv_owned, variations, &signal_owned)
        });

        match outcome {
            Ok(result) => return Ok(result),
            Err(err) => {
                ctx.log(
                    LogLevel::Warn,
                    "generation",
                    format!("attempt {}/{attempts} failed: {err:#}", attempt + 1),
                );
                last_err = Some(err);
                if attempt + 1 < attempts {
                    thread::sleep(Duration::from_millis(backoff_ms));
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("image generation failed with no attempts made")))
}

fn persist_pending_image(ctx: &JobContext, prompt: &str, item: &crate::providers::ProducedImage) {
    let image = GeneratedImage {
        id: crate::engine::new_id("img"),
        execution_id: ctx.execution.id.clone(),
        image_mapping_id: item.mapping_id.clone(),
        generation_prompt: crate::domain::sanitize_generation_prompt(prompt),
        temp_image_path: Some(item.output_path.to_string_lossy().into_owned()),
        final_image_path: None,
        qc_status: QcStatus::Pending,
        qc_reason: None,
        processing_settings: item.settings.clone(),
        metadata: ImageMetadata::default(),
    };
    if let Err(err) = ctx.persistence().save_generated_image(&image) {
        ctx.log(LogLevel::Error, "generation", format!("failed to persist image row: {err:#}"));
    }
}

fn persist_failed_item(ctx: &JobContext, prompt: &str, failure: &crate::providers::FailedItem) {
    let stage = crate::failure::Stage::from_label(&failure.stage);
    let reason = match stage {
        Some(stage) => QcReason::for_stage(stage),
        None => QcReason::unclassified(),
    };
    let image = GeneratedImage {
        id: crate::engine::new_id("img"),
        execution_id: ctx.execution.id.clone(),
        image_mapping_id: crate::engine::new_id("failed"),
        generation_prompt: crate::domain::sanitize_generation_prompt(prompt),
        temp_image_path: None,
        final_image_path: None,
        qc_status: QcStatus::QcFailed,
        qc_reason: Some(reason.to_string()),
        processing_settings: Value::Null,
        metadata: ImageMetadata {
            failure: Some(crate::domain::ImageFailure {
                stage: Some(failure.stage.clone()),
                message: Some(failure.message.clone()),
            }),
            ..Default::default()
        },
    };
    if let Err(err) = ctx.persistence().save_generated_image(&image) {
        ctx.log(LogLevel::Error, "generation", format!("failed to persist failed item: {err:#}"));
    }
}
