//! `rerun:*` commands (spec §4.3, §6): single and bulk rerun requests
//! against the Rerun Coordinator.

use tauri::State;

use crate::rerun::BulkRerunOutcome;

use super::AppState;

#[tauri::command]
pub fn rerun_single(state: State<'_, AppState>, execution_id: String) -> Result<String, String> {
    state.rerun_coordinator.rerun_single(&execution_id)
}

#[tauri::command]
pub fn rerun_bulk(state: State<'_, AppState>, execution_ids: Vec<String>) -> Result<BulkRerunOutcome, String> {
    state.rerun_coordinator.rerun_bulk(&execution_ids)
}
