//! Publisher-side half of the engine's event model. The engine never
//! holds a reference back to the RPC Adapter (spec §9 "the engine must
//! not hold a reference back to the RPC adapter") — callers register
//! closures here, and `commands::job` is the only module that actually
//! closes over a `tauri::AppHandle` to turn these into emitted events.
//! Pattern grounded on the teacher's `engine::listeners` register_* methods.

use std::sync::Arc;

use crate::sync_ext::MutexExt;

use super::state::{CompletionListener, JobProgress, LogEntry, LogListener, ProgressListener};
use super::JobEngine;

impl JobEngine {
    pub fn register_progress_listener<F>(&self, listener: F)
    where
        F: Fn(JobProgress) + Send + Sync + 'static,
    {
        self.inner.progress_listeners.lock_unpoisoned().push(Arc::new(listener));
    }

    pub fn register_log_listener<F>(&self, listener: F)
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        self.inner.log_listeners.lock_unpoisoned().push(Arc::new(listener));
    }

    /// Fires once per job, with `(execution_id, succeeded)`.
    pub fn register_completion_listener<F>(&self, listener: F)
    where
        F: Fn(String, bool) + Send + Sync + 'static,
    {
        self.inner.completion_listeners.lock_unpoisoned().push(Arc::new(listener));
    }
}

pub(super) fn notify_progress(inner: &super::state::Inner, progress: JobProgress) {
    let listeners = inner.progress_listeners.lock_unpoisoned().clone();
    for listener in &listeners {
        listener(progress);
    }
}

pub(super) fn notify_log(inner: &super::state::Inner, entry: LogEntry) {
    let listeners = inner.log_listeners.lock_unpoisoned().clone();
    for listener in &listeners {
        listener(entry.clone());
    }
}

pub(super) fn notify_completion(inner: &super::state::Inner, execution_id: String, succeeded: bool) {
    let listeners = inner.completion_listeners.lock_unpoisoned().clone();
    for listener in &listeners {
        listener(execution_id.clone(), succeeded);
    }
}
