#[macro_export]
macro_rules! debug_eprintln {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        {
            eprintln!($($arg)*);
        }
        // In release builds we still want the arguments to be "used" so we
        // don't get unused variable/import warnings, but we do not want to
        // evaluate potentially expensive formatting expressions.
        #[cfg(not(debug_assertions))]
        {
            let _ = || {
                let _ = format_args!($($arg)*);
            };
        }
    }};
}

mod commands;
mod domain;
mod engine;
mod failure;
mod paramgen;
mod persistence;
mod providers;
mod rerun;
mod retry_executor;
mod settings;
mod sync_ext;

#[cfg(test)]
mod lib_tests;

use std::sync::Arc;

use tauri::{Emitter, Manager};

use crate::commands::AppState;
use crate::engine::{JobEngine, JobProgress, ProviderBundle};
use crate::persistence::{JsonPersistence, PersistenceFacade};
use crate::providers::mock::{MockBackgroundRemover, MockImageProcessor, MockImageProvider, MockVisionProvider};
use crate::rerun::RerunCoordinator;
use crate::retry_executor::{RetryDeps, RetryExecutor};

/// Builds the bundle of vendor capabilities the Job Engine and Retry
/// Executor are injected with. Concrete remote vendor clients are out of
/// scope (`providers::mod` doc comment) — wired to the deterministic
/// mocks until real `ImageProvider`/`VisionProvider`/`BackgroundRemover`
/// implementations land behind `providers::http`.
fn build_provider_bundle() -> ProviderBundle {
    ProviderBundle {
        image: Arc::new(MockImageProvider::default()),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: true }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let persistence: Arc<dyn PersistenceFacade> = match JsonPersistence::load() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            crate::debug_eprintln!("failed to load persisted state: {err:#}");
            return;
        }
    };

    let providers = Arc::new(build_provider_bundle());
    let engine = JobEngine::new(persistence.clone(), providers.clone());
    let retry_executor = RetryExecutor::new(RetryDeps {
        persistence: persistence.clone(),
        processor: providers.processor.clone(),
        vision: providers.vision.clone(),
    });
    let rerun_coordinator = RerunCoordinator::new(engine.clone(), persistence.clone());

    let app_state = AppState {
        engine: engine.clone(),
        retry_executor,
        rerun_coordinator,
        persistence,
    };

    let app = tauri::Builder::default()
        .manage(app_state)
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(tauri::generate_handler![
            commands::dispatch_channel,
            commands::job::start_job,
            commands::job::stop_job,
            commands::job::force_stop_all,
            commands::job::get_job_status,
            commands::job::get_job_progress,
            commands::job::get_job_logs,
            commands::generated_image::get_generated_images_by_qc_status,
            commands::generated_image::update_generated_image_qc_status,
            commands::generated_image::delete_generated_image,
            commands::retry::retry_failed_images_batch,
            commands::rerun::rerun_single,
            commands::rerun::rerun_bulk,
            commands::settings::get_settings,
            commands::settings::save_settings,
        ])
        .setup(move |app| {
            // Stream progress and log events to the frontend so the UI does
            // not need to poll `job:progress`/`job:logs` (spec §6 progress
            // event wiring, mirrored from the teacher's own event-emitting
            // listener registration in its `setup` hook).
            let progress_handle = app.handle().clone();
            engine.register_progress_listener(move |progress: JobProgress| {
                if let Err(err) = progress_handle.emit("job://progress", progress) {
                    crate::debug_eprintln!("failed to emit job://progress event: {err}");
                }
            });

            let log_handle = app.handle().clone();
            engine.register_log_listener(move |entry| {
                if let Err(err) = log_handle.emit("job://log", entry) {
                    crate::debug_eprintln!("failed to emit job://log event: {err}");
                }
            });

            Ok(())
        })
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(err) => {
            crate::debug_eprintln!("error while building tauri application: {err:#}");
            return;
        }
    };

    app.run(|_app, _event| {});
}
