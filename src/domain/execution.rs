use serde::{Deserialize, Serialize};

use super::config::{JobConfiguration, RemoveBgFailureMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

/// Immutable snapshot of the configuration that produced an execution.
///
/// Invariant (spec §3): `api_keys` must never be populated here — secrets
/// are exported into the process environment at job start and never
/// written to the persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSnapshot {
    pub configuration_id: String,
    pub name: String,
    pub file_paths: super::config::FilePaths,
    pub parameters: super::config::Parameters,
    pub processing: super::config::ProcessingSettings,
    pub ai: super::config::AiSettings,
    /// Derived from `parameters.advanced_provider_settings_enabled`.
    pub runware_advanced_enabled: bool,
    /// Normalized copy of `processing.remove_bg_failure_mode`.
    pub remove_bg_failure_mode: RemoveBgFailureMode,
}

impl ConfigurationSnapshot {
    pub fn from_configuration(cfg: &JobConfiguration) -> Self {
        Self {
            configuration_id: cfg.id.clone(),
            name: cfg.name.clone(),
            file_paths: cfg.file_paths.clone(),
            parameters: cfg.parameters.clone(),
            processing: cfg.processing.clone(),
            ai: cfg.ai.clone(),
            runware_advanced_enabled: cfg.parameters.advanced_provider_settings_enabled,
            remove_bg_failure_mode: cfg.processing.remove_bg_failure_mode,
        }
    }
}

/// One row per job run. See spec §3 "JobExecution".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    pub id: String,
    pub configuration_id: String,
    pub configuration_snapshot: ConfigurationSnapshot,
    pub label: String,
    pub status: ExecutionStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub total_images: u32,
    pub successful_images: u32,
    pub failed_images: u32,
    pub error_message: Option<String>,
}

impl JobExecution {
    pub fn new(
        id: String,
        configuration_id: String,
        configuration_snapshot: ConfigurationSnapshot,
        label: String,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            configuration_id,
            configuration_snapshot,
            label,
            status: ExecutionStatus::Running,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            total_images: 0,
            successful_images: 0,
            failed_images: 0,
            error_message: None,
        }
    }
}
