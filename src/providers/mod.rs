//! Trait contracts for the external collaborators named in spec §1/§6:
//! `ImageProvider`, `VisionProvider`, `BackgroundRemover`, and the local
//! `ImageProcessor`/`CredentialStore` capabilities the engine depends on.
//! Concrete remote vendor clients are out of scope; [`mock`] provides a
//! deterministic stand-in used by the test suite.

pub mod http;
pub mod mock;

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::engine::cancellation::AbortSignal;

/// Parameters returned by the Prompt/Parameter Generator and consumed by
/// `ImageProvider::generate` (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub prompt: String,
    pub prompt_context: serde_json::Value,
    pub aspect_ratios: Vec<String>,
}

/// One image produced by an `ImageProvider` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducedImage {
    pub output_path: PathBuf,
    pub mapping_id: String,
    pub settings: serde_json::Value,
}

/// An item the provider could not produce, tagged with the stage that
/// failed (spec §4.1 step 2.4: "Persist any `failedItems` as `qc_failed`
/// with `qcReason = processing_failed:<stage>`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub stage: String,
    pub message: String,
}

/// Normalized form of the three result shapes an `ImageProvider` may
/// return in the source system (spec §9 "Dynamic result shapes → tagged
/// variants"): a bare path, a batch of produced images, or a
/// partially-successful batch with failures alongside successes.
#[derive(Debug, Clone)]
pub enum ImageProviderResult {
    Path(PathBuf),
    Batch(Vec<ProducedImage>),
    Partial {
        processed: Vec<ProducedImage>,
        failed: Vec<FailedItem>,
    },
}

impl ImageProviderResult {
    pub fn into_parts(self) -> (Vec<ProducedImage>, Vec<FailedItem>) {
        match self {
            ImageProviderResult::Path(path) => (
                vec![ProducedImage {
                    output_path: path,
                    mapping_id: uuid_like_id(),
                    settings: serde_json::Value::Null,
                }],
                Vec::new(),
            ),
            ImageProviderResult::Batch(items) => (items, Vec::new()),
            ImageProviderResult::Partial { processed, failed } => (processed, failed),
        }
    }
}

/// Best-effort opaque id generator for the bare-path result shape, which
/// carries no mapping id of its own. Real vendor clients always supply a
/// `mapping_id`; this path only exists to keep the tagged union total.
fn uuid_like_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("img_{nanos:x}")
}

/// Remote image-generation vendor capability (spec §1, §6).
pub trait ImageProvider: Send + Sync {
    fn generate(
        &self,
        params: &GenerationParameters,
        dimension_csv: &str,
        variations: u32,
        signal: &AbortSignal,
    ) -> Result<ImageProviderResult>;
}

/// Remote vision-model vendor capability used for both prompt synthesis
/// (spec §4.5), QC, and metadata regeneration (spec §4.1 steps 3-4).
pub trait VisionProvider: Send + Sync {
    fn generate_parameters(
        &self,
        keyword: &serde_json::Value,
        system_prompt: Option<&str>,
        keyword_file_path: Option<&str>,
        mj_version: &str,
        openai_model: &str,
        signal: &AbortSignal,
    ) -> Result<GenerationParameters>;

    fn run_quality_check(
        &self,
        image_path: &std::path::Path,
        original_prompt: &str,
        qc_prompt: Option<&str>,
        openai_model: &str,
        signal: &AbortSignal,
    ) -> Result<QualityCheckOutcome>;

    fn generate_metadata(
        &self,
        image_path: &std::path::Path,
        original_prompt: &str,
        metadata_prompt: Option<&str>,
        openai_model: &str,
        signal: &AbortSignal,
    ) -> Result<GeneratedMetadata>;
}

#[derive(Debug, Clone)]
pub struct QualityCheckOutcome {
    pub passed: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
    pub upload_tags: Vec<String>,
}

/// Remote background-removal vendor capability (spec §4.1 QC/move pass).
pub trait BackgroundRemover: Send + Sync {
    fn remove_background(
        &self,
        source: &std::path::Path,
        dest: &std::path::Path,
        signal: &AbortSignal,
    ) -> Result<RemoveBgOutcome>;
}

/// Result of a background-removal attempt, including whether the vendor
/// actually applied removal (used by the `mark_failed` policy check in
/// spec §4.1).
#[derive(Debug, Clone)]
pub struct RemoveBgOutcome {
    pub applied: bool,
    pub output_path: Option<PathBuf>,
}

/// Local image post-processing capability (convert/enhance/trim),
/// invoked by both the Job Engine's QC/move pass and the Retry Executor's
/// `runPostProcessing` (spec §4.2).
pub trait ImageProcessor: Send + Sync {
    fn process_image(
        &self,
        source: &std::path::Path,
        basename: &str,
        cfg: &ProcessingInvocation,
    ) -> Result<PathBuf, ProcessingStageError>;
}

#[derive(Debug, Clone)]
pub struct ProcessingInvocation {
    pub convert: bool,
    pub target_format: String,
    pub enhancement: bool,
    pub sharpening: f64,
    pub saturation: f64,
    pub trim_transparent: bool,
    pub temp_dir: PathBuf,
}

/// A processing failure tagged with the stage that produced it, so the
/// Failure Classifier can apply the soft/hard policy.
#[derive(Debug, Clone, thiserror::Error)]
#[error("processing stage {stage:?} failed: {message}")]
pub struct ProcessingStageError {
    pub stage: crate::failure::Stage,
    pub message: String,
}

/// OS-keychain-with-encrypted-DB-fallback credential store (spec §1, §8
/// round-trip law). External collaborator; only the contract lives here.
pub trait CredentialStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Result<Option<String>>;
    fn set_secret(&self, key: &str, value: &str) -> Result<()>;
}
