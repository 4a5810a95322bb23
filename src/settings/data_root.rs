//! Resolves the application data directory, trimmed from the teacher's
//! `ffui_core::data_root` module down to what this domain needs: a root
//! directory holding settings/config JSON and persisted executions, plus
//! default output/temp directories a `JobConfiguration` can fall back to.

use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;

pub const SETTINGS_FILENAME: &str = "imgforge.settings.json";
pub const CONFIGURATIONS_FILENAME: &str = "imgforge.configurations.json";
pub const EXECUTIONS_FILENAME: &str = "imgforge.executions.json";
pub const IMAGES_FILENAME: &str = "imgforge.images.json";

static OVERRIDE_ROOT: OnceCell<PathBuf> = OnceCell::new();

/// Overrides the resolved data root, for tests that need an isolated
/// temp directory instead of the real platform config directory.
#[cfg(test)]
pub fn override_data_root_for_tests(path: PathBuf) {
    let _ = OVERRIDE_ROOT.set(path);
}

pub fn data_root() -> Result<PathBuf> {
    if let Some(path) = OVERRIDE_ROOT.get() {
        return Ok(path.clone());
    }
    let base = dirs_data_dir().context("failed to resolve platform data directory")?;
    Ok(base.join("imgforge"))
}

/// Minimal stand-in for the `dirs`/`directories` crate lookup the teacher
/// performs via its own `data_root::resolve` module; kept dependency-free
/// since this crate does not otherwise need a directories crate.
fn dirs_data_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("IMGFORGE_DATA_DIR") {
        return Some(PathBuf::from(path));
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Application Support"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".local/share")))
    }
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(data_root()?.join(SETTINGS_FILENAME))
}

pub fn configurations_path() -> Result<PathBuf> {
    Ok(data_root()?.join(CONFIGURATIONS_FILENAME))
}

pub fn executions_path() -> Result<PathBuf> {
    Ok(data_root()?.join(EXECUTIONS_FILENAME))
}

pub fn images_path() -> Result<PathBuf> {
    Ok(data_root()?.join(IMAGES_FILENAME))
}

pub fn default_output_directory() -> PathBuf {
    data_root().unwrap_or_else(|_| PathBuf::from(".")).join("output")
}

pub fn default_temp_directory() -> PathBuf {
    data_root().unwrap_or_else(|_| PathBuf::from(".")).join("temp")
}
