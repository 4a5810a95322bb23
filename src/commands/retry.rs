//! `failed-image:retry-batch` command (spec §4.2, §6): validates a batch
//! of image ids before handing them to the Retry Executor.

use tauri::State;

use crate::domain::RetryJobRequest;

use super::AppState;

/// Rejects the batch outright if `useOriginalSettings` is set and the
/// images span more than one job execution (spec §4.2: original settings
/// only make sense replayed against a single execution's configuration).
#[tauri::command]
pub fn retry_failed_images_batch(
    state: State<'_, AppState>,
    image_ids: Vec<String>,
    request_template: RetryJobRequest,
) -> Result<Vec<String>, String> {
    if request_template.use_original_settings {
        let mut execution_ids = Vec::new();
        for image_id in &image_ids {
            let image = state
                .persistence
                .get_generated_image(image_id)
                .map_err(|err| err.to_string())?
                .ok_or_else(|| format!("no image found for id {image_id}"))?;
            if !execution_ids.contains(&image.execution_id) {
                execution_ids.push(image.execution_id);
            }
        }
        if execution_ids.len() > 1 {
            return Err("different jobs".to_string());
        }
    }

    state.retry_executor.add_batch_retry_job(&image_ids, request_template)
}
