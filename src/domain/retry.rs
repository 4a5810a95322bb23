use serde::{Deserialize, Serialize};

use crate::failure::Stage;

/// `failOptions` semantics (spec §4.2): when `enabled` is false every stage
/// error is soft; when `enabled` is true a stage error is hard iff its
/// stage is listed in `steps`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailOptions {
    pub enabled: bool,
    pub steps: Vec<Stage>,
}

impl FailOptions {
    pub fn is_hard(&self, stage: Stage) -> bool {
        self.enabled && self.steps.contains(&stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryJobType {
    Reprocess,
}

/// One enqueued retry request for a single image. Built from a
/// `addBatchRetryJob` call, which fans a batch of image ids out into one
/// `RetryJobRequest` per id (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryJobRequest {
    pub image_id: String,
    #[serde(rename = "type")]
    pub job_type: RetryJobType,
    pub use_original_settings: bool,
    pub modified_settings: Option<serde_json::Value>,
    pub include_metadata: bool,
    pub fail_options: FailOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryJobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryJobRecord {
    pub id: String,
    pub request: RetryJobRequest,
    pub status: RetryJobStatus,
    pub error: Option<String>,
}
