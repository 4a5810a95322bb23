//! Shared engine state: a single `Mutex<EngineState>` guarded by a
//! `Condvar`, the worker thread's handoff queue, and listener registries —
//! generalized from the teacher's `Inner`/`EngineState` pair down from "a
//! queue of many transcode jobs" to "at most one running job execution"
//! (spec §4.1: the engine enforces single-job-at-a-time via
//! `JOB_ALREADY_RUNNING`).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::JobExecution;

use super::cancellation::AbortSignal;

pub const LOG_BUFFER_CAPACITY: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One structured log line (spec §5 "Log buffer", SPEC_FULL.md ambient
/// logging section). `step_name`/`sub_step` mirror the pipeline stage
/// names in spec §4.1 (`generation`, `metadata`, `qc_move`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub step_name: String,
    pub sub_step: Option<String>,
    pub message: String,
    pub timestamp_ms: u64,
}

/// The job the worker thread is being asked to start. Queued by
/// `JobEngine::start_job` and consumed by the single worker thread.
pub(crate) struct PendingStart {
    pub execution: JobExecution,
    pub signal: AbortSignal,
    pub is_rerun: bool,
    pub database_execution_id: Option<String>,
}

/// The job currently occupying the engine, if any.
pub(crate) struct RunningJob {
    pub execution_id: String,
    pub configuration_id: String,
    pub is_rerun: bool,
    pub database_execution_id: Option<String>,
    pub signal: AbortSignal,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total_images: u32,
    pub successful_images: u32,
    pub failed_images: u32,
    pub current_generation: u32,
}

pub(crate) struct EngineState {
    pub(crate) running: Option<RunningJob>,
    pub(crate) pending_start: Option<PendingStart>,
    pub(crate) logs: VecDeque<LogEntry>,
    pub(crate) progress: JobProgress,
    pub(crate) last_completed_execution_id: Option<String>,
    pub(crate) spawned_worker: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            running: None,
            pending_start: None,
            logs: VecDeque::with_capacity(LOG_BUFFER_CAPACITY),
            progress: JobProgress::default(),
            last_completed_execution_id: None,
            spawned_worker: false,
        }
    }

    pub(crate) fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() >= LOG_BUFFER_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }
}

pub(crate) type ProgressListener = Arc<dyn Fn(JobProgress) + Send + Sync + 'static>;
pub(crate) type LogListener = Arc<dyn Fn(LogEntry) + Send + Sync + 'static>;
pub(crate) type CompletionListener = Arc<dyn Fn(String, bool) + Send + Sync + 'static>;

pub(crate) struct Inner {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) cv: Condvar,
    pub(crate) progress_listeners: Mutex<Vec<ProgressListener>>,
    pub(crate) log_listeners: Mutex<Vec<LogListener>>,
    pub(crate) completion_listeners: Mutex<Vec<CompletionListener>>,
}

impl Inner {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::new()),
            cv: Condvar::new(),
            progress_listeners: Mutex::new(Vec::new()),
            log_listeners: Mutex::new(Vec::new()),
            completion_listeners: Mutex::new(Vec::new()),
        }
    }
}
