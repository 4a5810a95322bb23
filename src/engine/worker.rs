//! The single background worker thread: waits for a `PendingStart`, runs
//! the job pipeline with panic isolation, then clears the running slot and
//! fires the completion listener. Pattern grounded on the teacher's
//! `worker::spawner::spawn_worker`/`worker_loop`/`guarded_job_runner`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::sync_ext::{CondvarExt, MutexExt};

use super::listeners::notify_completion;
use super::state::RunningJob;
use super::JobEngine;

pub(super) fn spawn_worker(engine: &Arc<JobEngine>) {
    let engine = engine.clone();
    let spawned = thread::Builder::new()
        .name("imgforge-job-worker".to_string())
        .spawn(move || worker_loop(&engine));
    if let Err(err) = spawned {
        crate::debug_eprintln!("failed to spawn job worker thread: {err}");
    }
}

fn worker_loop(engine: &Arc<JobEngine>) {
    loop {
        let pending = {
            let mut state = engine.inner.state.lock_unpoisoned();
            loop {
                if let Some(pending) = state.pending_start.take() {
                    break pending;
                }
                state = engine.inner.cv.wait_unpoisoned(state);
            }
        };

        let execution_id = pending.execution.id.clone();
        let configuration_id = pending.execution.configuration_id.clone();
        {
            let mut state = engine.inner.state.lock_unpoisoned();
            state.running = Some(RunningJob {
                execution_id: execution_id.clone(),
                configuration_id,
                is_rerun: pending.is_rerun,
                database_execution_id: pending.database_execution_id.clone(),
                signal: pending.signal.clone(),
            });
        }

        let succeeded = run_guarded(engine, pending.execution, pending.signal);

        {
            let mut state = engine.inner.state.lock_unpoisoned();
            state.running = None;
            state.last_completed_execution_id = Some(execution_id.clone());
        }
        notify_completion(&engine.inner, execution_id, succeeded);
        engine.inner.cv.notify_all();
    }
}

fn run_guarded(
    engine: &Arc<JobEngine>,
    execution: crate::domain::JobExecution,
    signal: super::cancellation::AbortSignal,
) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| {
        super::job_runner::execute(engine, execution, signal)
    }));
    match result {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            super::log(
                &engine.inner,
                super::state::LogLevel::Error,
                "finalize",
                None,
                format!("job failed: {err:#}"),
            );
            false
        }
        Err(payload) => {
            let message = panic_payload_to_string(&*payload);
            super::log(
                &engine.inner,
                super::state::LogLevel::Error,
                "finalize",
                None,
                format!("job panicked: {message}"),
            );
            false
        }
    }
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
