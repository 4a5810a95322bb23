//! Application-wide settings, distinct from a per-job `JobConfiguration`.
//! Loaded/saved as JSON via the same atomic-write pattern the teacher
//! uses for its own `AppSettings` (spec §4.6 Persistence Facade "Config"
//! group: `get_settings` / `save_settings` / `get_default_settings`).

pub mod data_root;
pub(crate) mod io;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use data_root::settings_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub default_output_directory: String,
    pub default_temp_directory: String,
    pub default_generation_retry_attempts: u32,
    pub default_generation_retry_backoff_ms: u64,
    pub default_polling_timeout_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_output_directory: data_root::default_output_directory()
                .to_string_lossy()
                .into_owned(),
            default_temp_directory: data_root::default_temp_directory()
                .to_string_lossy()
                .into_owned(),
            default_generation_retry_attempts: 2,
            default_generation_retry_backoff_ms: 1_000,
            default_polling_timeout_ms: 120_000,
        }
    }
}

pub fn load_settings() -> Result<AppSettings> {
    let path = settings_path()?;
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    io::read_json_file(&path)
}

pub fn save_settings(settings: &AppSettings) -> Result<()> {
    let path = settings_path()?;
    io::write_json_file(&path, settings)
}
