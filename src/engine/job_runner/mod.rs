//! The per-job pipeline (spec §4.1): generation loop → metadata pass →
//! QC/move pass → safety reconciliation → finalize. Each stage is its own
//! module so the orchestration here stays a short, readable sequence,
//! mirroring how the teacher's `job_runner_process*` family splits a long
//! transcode pipeline into one file per phase.

mod finalize;
mod generation_loop;
mod metadata_pass;
mod qc_move_pass;
mod safety_reconcile;

use std::sync::Arc;

use anyhow::Result;

use crate::domain::JobExecution;
use crate::persistence::PersistenceFacade;

use super::cancellation::AbortSignal;
use super::state::LogLevel;
use super::{log, JobEngine, ProviderBundle};

/// Everything a pipeline stage needs: the engine (for logging/cancel
/// checks), the execution row, and shortcuts to its persistence/provider
/// dependencies.
pub(crate) struct JobContext {
    pub(crate) engine: Arc<JobEngine>,
    pub(crate) execution: JobExecution,
    pub(crate) signal: AbortSignal,
}

impl JobContext {
    fn persistence(&self) -> &Arc<dyn PersistenceFacade> {
        self.engine.persistence()
    }

    fn providers(&self) -> &Arc<ProviderBundle> {
        self.engine.providers()
    }

    fn log(&self, level: LogLevel, sub_step: &str, message: impl Into<String>) {
        log(&self.engine.inner, level, "job_runner", Some(sub_step), message);
    }
}

pub(super) fn execute(engine: &Arc<JobEngine>, execution: JobExecution, signal: AbortSignal) -> Result<()> {
    let mut ctx = JobContext {
        engine: engine.clone(),
        execution,
        signal,
    };

    ctx.log(LogLevel::Info, "init", "job started");

    let generation_outcome = generation_loop::run(&mut ctx);
    let metadata_outcome = metadata_pass::run(&mut ctx);
    let qc_outcome = qc_move_pass::run(&mut ctx);
    if let Err(err) = safety_reconcile::run(&mut ctx) {
        ctx.log(LogLevel::Error, "safety_reconcile", format!("reconciliation pass failed: {err:#}"));
    }
    let upstream_succeeded = generation_outcome.is_ok() && metadata_outcome.is_ok() && qc_outcome.is_ok();
    finalize::run(&mut ctx, upstream_succeeded)?;

    generation_outcome?;
    metadata_outcome?;
    qc_outcome?;
    Ok(())
}
