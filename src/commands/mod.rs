//! RPC Adapter (spec §6, §9): thin Tauri `#[tauri::command]` wrappers
//! around the Job Engine, Retry Executor, Rerun Coordinator, and
//! Persistence Facade. Mirrors the teacher's `commands::*` module split —
//! one file per concern, registered in `lib.rs`'s `invoke_handler`.

pub mod generated_image;
pub mod job;
pub mod rerun;
pub mod retry;
pub mod settings;

use std::sync::Arc;

use crate::engine::JobEngine;
use crate::persistence::PersistenceFacade;
use crate::rerun::RerunCoordinator;
use crate::retry_executor::RetryExecutor;

/// Everything a command handler needs, managed as Tauri state.
pub struct AppState {
    pub engine: Arc<JobEngine>,
    pub retry_executor: Arc<RetryExecutor>,
    pub rerun_coordinator: Arc<RerunCoordinator>,
    pub persistence: Arc<dyn PersistenceFacade>,
}

/// The whitelisted RPC channel names (spec §6). Concrete commands are
/// already registered individually with Tauri's typed `invoke_handler`;
/// this whitelist exists for the free-form `invoke_channel` style entry
/// point the teacher's own `commands/mod.rs` also exposes alongside its
/// typed commands.
const KNOWN_CHANNELS: &[&str] = &[
    "job:start",
    "job:stop",
    "job:force-stop-all",
    "job:status",
    "job:progress",
    "job:logs",
    "generated-image:get-by-qc-status",
    "generated-image:update-qc-status",
    "generated-image:delete",
    "failed-image:retry-batch",
    "get-settings",
    "save-settings",
    "rerun:single",
    "rerun:bulk",
    "zip-export:progress",
];

/// Rejects any channel name not in [`KNOWN_CHANNELS`], per spec §6
/// "unknown channels must be rejected as `Invalid channel: <name>`".
#[tauri::command]
pub fn dispatch_channel(channel: String) -> Result<(), String> {
    if KNOWN_CHANNELS.contains(&channel.as_str()) {
        Ok(())
    } else {
        Err(format!("Invalid channel: {channel}"))
    }
}
