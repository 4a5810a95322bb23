//! `get-settings`/`save-settings` commands (spec §6): thin passthrough to
//! the Persistence Facade's config group.

use tauri::State;

use crate::settings::AppSettings;

use super::AppState;

#[tauri::command]
pub fn get_settings(state: State<'_, AppState>) -> Result<AppSettings, String> {
    state.persistence.get_settings().map_err(|err| err.to_string())
}

#[tauri::command]
pub fn save_settings(state: State<'_, AppState>, settings: AppSettings) -> Result<(), String> {
    state.persistence.save_settings(&settings).map_err(|err| err.to_string())
}
