//! Finalize (spec §4.1 step 6): wait for any still-in-flight QC rows to
//! settle, roll up final counts onto the `JobExecution` row, and set its
//! terminal status. Rerun advancement is not triggered from here — the
//! Rerun Coordinator subscribes to `JobEngine::register_completion_listener`
//! instead, so the engine never holds a reference back to it (spec §9).

use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::domain::{ExecutionStatus, QcStatus};
use crate::engine::state::LogLevel;
use crate::engine::now_ms;

use super::JobContext;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SETTLE_POLL_MAX_ATTEMPTS: u32 = 20;

pub(super) fn run(ctx: &mut JobContext, upstream_succeeded: bool) -> Result<()> {
    wait_for_qc_to_settle(ctx);

    let images = ctx.persistence().get_generated_images_by_execution(&ctx.execution.id)?;
    let total = images.len() as u32;
    let successful = images.iter().filter(|img| img.qc_status == QcStatus::Approved).count() as u32;
    let failed = images
        .iter()
        .filter(|img| matches!(img.qc_status, QcStatus::QcFailed | QcStatus::RetryFailed))
        .count() as u32;

    ctx.execution.total_images = total;
    ctx.execution.successful_images = successful;
    ctx.execution.failed_images = failed;
    ctx.execution.updated_at_ms = now_ms();
    ctx.execution.status = if ctx.signal.is_aborted() {
        ExecutionStatus::Stopped
    } else if upstream_succeeded {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::Failed
    };
    if ctx.execution.status == ExecutionStatus::Failed && ctx.execution.error_message.is_none() {
        ctx.execution.error_message = Some("one or more pipeline stages failed".to_string());
    }

    ctx.persistence().update_job_execution(&ctx.execution)?;
    ctx.log(
        LogLevel::Info,
        "finalize",
        format!(
            "job {:?}: {successful}/{total} succeeded, {failed} failed",
            ctx.execution.status
        ),
    );
    Ok(())
}

fn wait_for_qc_to_settle(ctx: &JobContext) {
    for _ in 0..SETTLE_POLL_MAX_ATTEMPTS {
        let Ok(images) = ctx.persistence().get_generated_images_by_execution(&ctx.execution.id) else {
            return;
        };
        let unsettled = images
            .iter()
            .any(|img| matches!(img.qc_status, QcStatus::Pending | QcStatus::Processing | QcStatus::RetryPending));
        if !unsettled {
            return;
        }
        thread::sleep(SETTLE_POLL_INTERVAL);
    }
}
