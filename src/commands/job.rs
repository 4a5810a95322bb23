//! `job:*` commands (spec §6): start/stop/status/progress/logs against the
//! Job Engine.

use tauri::State;

use crate::domain::JobConfiguration;
use crate::engine::{JobProgress, JobStatusSnapshot, LogEntry};

use super::AppState;

#[tauri::command]
pub async fn start_job(state: State<'_, AppState>, configuration: JobConfiguration) -> Result<String, String> {
    let engine = state.engine.clone();
    tauri::async_runtime::spawn_blocking(move || engine.start_job(configuration, None, None).map_err(|err| err.to_string()))
        .await
        .map_err(|err| format!("failed to join start_job task: {err}"))?
}

#[tauri::command]
pub fn stop_job(state: State<'_, AppState>, execution_id: String) -> Result<(), String> {
    state.engine.stop_job(&execution_id).map_err(|err| err.to_string())
}

#[tauri::command]
pub fn force_stop_all(state: State<'_, AppState>) {
    state.engine.force_stop_all();
}

#[tauri::command]
pub fn get_job_status(state: State<'_, AppState>) -> JobStatusSnapshot {
    state.engine.get_job_status()
}

#[tauri::command]
pub fn get_job_progress(state: State<'_, AppState>) -> JobProgress {
    state.engine.get_job_progress()
}

#[tauri::command]
pub fn get_job_logs(state: State<'_, AppState>, since_index: usize) -> Vec<LogEntry> {
    state.engine.get_job_logs(since_index)
}
