//! `runPostProcessing`'s soft/hard resolution algorithm (spec §4.2 step 6):
//! run local post-processing once, and only escalate a stage failure to a
//! hard `RetryFailed` outcome when `failOptions` explicitly names that
//! stage. Otherwise the retry falls back to the pre-processing source
//! path and continues — a retry that degrades quietly is still progress.

use std::path::{Path, PathBuf};

use crate::domain::FailOptions;
use crate::failure::{is_hard_failure, QcReason, Stage};
use crate::providers::{ImageProcessor, ProcessingInvocation};

pub(super) struct PostProcessingOutcome {
    pub(super) path: PathBuf,
    pub(super) degraded_stage: Option<Stage>,
}

pub(super) fn run_post_processing(
    processor: &dyn ImageProcessor,
    source: &Path,
    basename: &str,
    invocation: &ProcessingInvocation,
    fail_options: &FailOptions,
) -> Result<PostProcessingOutcome, QcReason> {
    match processor.process_image(source, basename, invocation) {
        Ok(path) => Ok(PostProcessingOutcome { path, degraded_stage: None }),
        Err(stage_error) => {
            if is_hard_failure(stage_error.stage, fail_options) {
                Err(QcReason::for_stage(stage_error.stage))
            } else {
                Ok(PostProcessingOutcome {
                    path: source.to_path_buf(),
                    degraded_stage: Some(stage_error.stage),
                })
            }
        }
    }
}

/// Moves a processed file into the output directory under
/// `<imageMappingId>_<basename>`, applying the same soft/hard resolution
/// to a `save_final` failure.
pub(super) fn move_into_output(
    source: &Path,
    output_dir: &str,
    mapping_id: &str,
    fail_options: &FailOptions,
) -> Result<PathBuf, QcReason> {
    let basename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let dest = Path::new(output_dir).join(format!("{mapping_id}_{basename}"));

    if std::fs::rename(source, &dest).is_ok() {
        return Ok(dest);
    }
    match std::fs::copy(source, &dest) {
        Ok(_) => {
            let _ = std::fs::remove_file(source);
            Ok(dest)
        }
        Err(_) if !is_hard_failure(Stage::SaveFinal, fail_options) => Ok(source.to_path_buf()),
        Err(_) => Err(QcReason::for_stage(Stage::SaveFinal)),
    }
}
