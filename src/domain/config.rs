use serde::{Deserialize, Serialize};

/// Credentials loaded into the process environment for the duration of a
/// job. Never persisted as part of a [`super::execution::JobExecution`]
/// snapshot — see `JobExecution::configuration_snapshot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub runware: Option<String>,
    pub remove_bg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePaths {
    pub output_directory: Option<String>,
    pub temp_directory: Option<String>,
    pub keyword_file: Option<String>,
    pub system_prompt_file: Option<String>,
    pub quality_check_prompt_file: Option<String>,
    pub metadata_prompt_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    Single,
    Relax,
    Batch,
}

impl Default for ProcessMode {
    fn default() -> Self {
        ProcessMode::Single
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    pub process_mode: ProcessMode,
    pub count: u32,
    pub variations: u32,
    pub openai_model: String,
    pub runware_model: String,
    pub output_format: String,
    /// Comma-separated dimension list, e.g. `"1024x1024,1536x1024"`.
    pub dimension_csv: String,
    pub keyword_random: bool,
    pub polling_timeout_enabled: bool,
    pub polling_timeout_ms: u64,
    pub generation_retry_attempts: u32,
    pub generation_retry_backoff_ms: u64,
    pub advanced_provider_settings_enabled: bool,
    pub advanced_provider_settings_payload: Option<serde_json::Value>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            process_mode: ProcessMode::default(),
            count: 1,
            variations: 1,
            openai_model: "gpt-4o-mini".to_string(),
            runware_model: "runware:100@1".to_string(),
            output_format: "jpg".to_string(),
            dimension_csv: "1024x1024".to_string(),
            keyword_random: true,
            polling_timeout_enabled: true,
            polling_timeout_ms: 120_000,
            generation_retry_attempts: 2,
            generation_retry_backoff_ms: 1_000,
            advanced_provider_settings_enabled: false,
            advanced_provider_settings_payload: None,
        }
    }
}

/// Policy attached to `removeBg`: best-effort (`Approve`) or strict
/// (`MarkFailed`). See the Failure Classifier's remove-bg policy in
/// `core::engine::job_runner::qc_move_pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveBgFailureMode {
    Approve,
    MarkFailed,
}

impl Default for RemoveBgFailureMode {
    fn default() -> Self {
        RemoveBgFailureMode::Approve
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSettings {
    pub remove_background: bool,
    pub remove_bg_failure_mode: RemoveBgFailureMode,
    pub image_convert: bool,
    pub convert_target_format: String,
    pub enhancement_enabled: bool,
    pub enhancement_sharpening: f64,
    pub enhancement_saturation: f64,
    pub trim_transparent: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            remove_background: false,
            remove_bg_failure_mode: RemoveBgFailureMode::default(),
            image_convert: false,
            convert_target_format: "jpg".to_string(),
            enhancement_enabled: false,
            enhancement_sharpening: 0.0,
            enhancement_saturation: 0.0,
            trim_transparent: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub run_quality_check: bool,
    pub run_metadata_gen: bool,
    /// Loaded from `FilePaths::quality_check_prompt_file` at job start;
    /// absent if the file could not be read (feature silently disabled).
    pub quality_check_prompt: Option<String>,
    /// Loaded from `FilePaths::metadata_prompt_file` at job start.
    pub metadata_prompt: Option<String>,
}

/// One user-saved job configuration. See spec §3 "JobConfiguration".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub api_keys: ApiKeys,
    pub file_paths: FilePaths,
    pub parameters: Parameters,
    pub processing: ProcessingSettings,
    pub ai: AiSettings,
}

impl JobConfiguration {
    /// Fields `startJob` requires to be present before a job may launch.
    /// Mirrors the Job Engine's validation contract in spec §4.1.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_keys.openai.as_deref().unwrap_or("").is_empty() {
            return Err("Missing OpenAI API key".to_string());
        }
        if self.api_keys.runware.as_deref().unwrap_or("").is_empty() {
            return Err("Missing image provider API key".to_string());
        }
        if self
            .file_paths
            .output_directory
            .as_deref()
            .unwrap_or("")
            .is_empty()
        {
            return Err("Missing output directory".to_string());
        }
        Ok(())
    }
}
