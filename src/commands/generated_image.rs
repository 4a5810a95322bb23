//! `generated-image:*` commands (spec §6): read/update/delete a single
//! image row via the Persistence Facade.

use tauri::State;

use crate::domain::{GeneratedImage, QcStatus};

use super::AppState;

#[tauri::command]
pub fn get_generated_images_by_qc_status(state: State<'_, AppState>, status: QcStatus) -> Result<Vec<GeneratedImage>, String> {
    let images = state.persistence.get_all_generated_images().map_err(|err| err.to_string())?;
    Ok(images.into_iter().filter(|image| image.qc_status == status).collect())
}

#[tauri::command]
pub fn update_generated_image_qc_status(
    state: State<'_, AppState>,
    image_id: String,
    status: QcStatus,
    reason: String,
) -> Result<(), String> {
    state
        .persistence
        .update_qc_status(&image_id, status, &reason)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn delete_generated_image(state: State<'_, AppState>, image_id: String) -> Result<(), String> {
    state.persistence.delete_generated_image(&image_id).map_err(|err| err.to_string())
}
