//! Deterministic provider implementations used by the test suite so the
//! Job Engine and Retry Executor are exercisable end-to-end without real
//! vendor credentials. Shaped after the local-client patterns in
//! `other_examples/…RecursiveIntell-VisionForge…executor.rs` (queue a
//! request, poll/wait, download to a local path) and
//! `other_examples/…nanobanan-cli…job.rs` (per-image status modeling).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;

use crate::engine::cancellation::AbortSignal;
use crate::failure::Stage;

use super::{
    BackgroundRemover, FailedItem, GeneratedMetadata, GenerationParameters, ImageProcessor,
    ImageProvider, ImageProviderResult, ProcessingInvocation, ProcessingStageError, ProducedImage,
    QualityCheckOutcome, RemoveBgOutcome, VisionProvider,
};

/// A mock image provider that writes a tiny placeholder file per
/// requested variation and assigns a stable, incrementing mapping id.
pub struct MockImageProvider {
    counter: AtomicU64,
    pub fail_after: Option<u32>,
}

impl Default for MockImageProvider {
    fn default() -> Self {
        Self {
            counter: AtomicU64::new(1),
            fail_after: None,
        }
    }
}

impl ImageProvider for MockImageProvider {
    fn generate(
        &self,
        params: &GenerationParameters,
        _dimension_csv: &str,
        variations: u32,
        signal: &AbortSignal,
    ) -> Result<ImageProviderResult> {
        signal.check()?;
        let mut produced = Vec::new();
        let temp_dir = std::env::temp_dir().join("imgforge-mock-provider");
        fs::create_dir_all(&temp_dir)?;
        for i in 0..variations {
            let id = self.counter.fetch_add(1, Ordering::SeqCst);
            let mapping_id = format!("mock-{id}");
            let path = temp_dir.join(format!("{mapping_id}.png"));
            fs::write(&path, format!("mock-image {} variation {i}", params.prompt))?;
            produced.push(ProducedImage {
                output_path: path,
                mapping_id,
                settings: serde_json::json!({"variation": i}),
            });
        }
        Ok(ImageProviderResult::Batch(produced))
    }
}

/// A mock vision provider with switchable QC outcome, useful for driving
/// the approve/fail branches in tests deterministically.
pub struct MockVisionProvider {
    pub qc_passes: Mutex<bool>,
}

impl Default for MockVisionProvider {
    fn default() -> Self {
        Self {
            qc_passes: Mutex::new(true),
        }
    }
}

impl VisionProvider for MockVisionProvider {
    fn generate_parameters(
        &self,
        keyword: &serde_json::Value,
        system_prompt: Option<&str>,
        _keyword_file_path: Option<&str>,
        _mj_version: &str,
        _openai_model: &str,
        signal: &AbortSignal,
    ) -> Result<GenerationParameters> {
        signal.check()?;
        let base = keyword
            .as_str()
            .map(str::to_string)
            .or_else(|| keyword.get(0).and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| "a generic scene".to_string());
        let prompt = match system_prompt {
            Some(sys) if !sys.trim().is_empty() => format!("{sys}: {base}"),
            _ => base,
        };
        Ok(GenerationParameters {
            prompt,
            prompt_context: keyword.clone(),
            aspect_ratios: vec!["1:1".to_string()],
        })
    }

    fn run_quality_check(
        &self,
        image_path: &Path,
        _original_prompt: &str,
        _qc_prompt: Option<&str>,
        _openai_model: &str,
        signal: &AbortSignal,
    ) -> Result<QualityCheckOutcome> {
        signal.check()?;
        if !image_path.exists() {
            anyhow::bail!("QC input path is missing");
        }
        let passed = *self.qc_passes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(QualityCheckOutcome {
            passed,
            reason: if passed {
                None
            } else {
                Some("image does not match prompt".to_string())
            },
        })
    }

    fn generate_metadata(
        &self,
        _image_path: &Path,
        original_prompt: &str,
        _metadata_prompt: Option<&str>,
        _openai_model: &str,
        signal: &AbortSignal,
    ) -> Result<GeneratedMetadata> {
        signal.check()?;
        Ok(GeneratedMetadata {
            title: original_prompt.chars().take(40).collect(),
            description: original_prompt.to_string(),
            upload_tags: vec!["generated".to_string()],
        })
    }
}

/// A mock background remover, toggled via `should_apply`.
pub struct MockBackgroundRemover {
    pub should_apply: bool,
}

impl BackgroundRemover for MockBackgroundRemover {
    fn remove_background(
        &self,
        source: &Path,
        dest: &Path,
        signal: &AbortSignal,
    ) -> Result<RemoveBgOutcome> {
        signal.check()?;
        if !self.should_apply {
            return Ok(RemoveBgOutcome {
                applied: false,
                output_path: None,
            });
        }
        fs::copy(source, dest)?;
        Ok(RemoveBgOutcome {
            applied: true,
            output_path: Some(dest.to_path_buf()),
        })
    }
}

/// A mock local image processor that copies the source to a temp file
/// with the target extension, optionally simulating a hard stage failure.
pub struct MockImageProcessor {
    pub fail_stage: Option<Stage>,
}

impl ImageProcessor for MockImageProcessor {
    fn process_image(
        &self,
        source: &Path,
        basename: &str,
        cfg: &ProcessingInvocation,
    ) -> Result<PathBuf, ProcessingStageError> {
        if let Some(stage) = self.fail_stage {
            return Err(ProcessingStageError {
                stage,
                message: format!("mock failure injected at {stage:?}"),
            });
        }
        let ext = if cfg.convert {
            cfg.target_format.as_str()
        } else {
            "png"
        };
        let dest = cfg.temp_dir.join(format!("{basename}.{ext}"));
        fs::copy(source, &dest).map_err(|err| ProcessingStageError {
            stage: Stage::Convert,
            message: err.to_string(),
        })?;
        Ok(dest)
    }
}

#[derive(Default)]
pub struct MockFailedItemsProvider {
    pub failed_stage: String,
}

impl ImageProvider for MockFailedItemsProvider {
    fn generate(
        &self,
        _params: &GenerationParameters,
        _dimension_csv: &str,
        _variations: u32,
        signal: &AbortSignal,
    ) -> Result<ImageProviderResult> {
        signal.check()?;
        Ok(ImageProviderResult::Partial {
            processed: Vec::new(),
            failed: vec![FailedItem {
                stage: self.failed_stage.clone(),
                message: "mock provider failure".to_string(),
            }],
        })
    }
}
