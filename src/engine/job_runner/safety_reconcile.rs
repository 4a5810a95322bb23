//! Safety reconciliation (spec §4.1 step 5): re-read every image row for
//! the execution and repair any `Approved` row left without a
//! `final_image_path` — a move that succeeded on disk but whose row
//! update failed to persist would otherwise leave a permanently
//! unreachable approved image.
//!
//! Under `removeBgFailureMode=mark_failed`, a missing `final_image_path`
//! is never patched over with a non-final path: the image is force-failed
//! as `qc_failed`/`processing_failed:remove_bg` instead, since that mode
//! means the caller asked for a strict removeBg contract rather than a
//! best-effort fallback.

use anyhow::Result;

use crate::domain::{QcStatus, RemoveBgFailureMode};
use crate::engine::state::LogLevel;
use crate::failure::{QcReason, Stage};

use super::JobContext;

pub(super) fn run(ctx: &mut JobContext) -> Result<()> {
    let mark_failed_mode = ctx.execution.configuration_snapshot.remove_bg_failure_mode == RemoveBgFailureMode::MarkFailed;
    let images = ctx.persistence().get_generated_images_by_execution(&ctx.execution.id)?;
    for mut image in images {
        if image.qc_status != QcStatus::Approved {
            continue;
        }
        if image.final_image_path.is_some() {
            continue;
        }

        if mark_failed_mode {
            ctx.log(
                LogLevel::Error,
                "safety_reconcile",
                format!("{} approved with no final path under mark_failed mode, forcing qc_failed", image.id),
            );
            ctx.persistence()
                .update_qc_status(&image.id, QcStatus::QcFailed, &QcReason::for_stage(Stage::RemoveBg).to_string())
                .ok();
            continue;
        }

        match image.temp_image_path.clone() {
            Some(temp_path) => {
                ctx.log(
                    LogLevel::Warn,
                    "safety_reconcile",
                    format!("{} approved with no final path, repairing from temp path", image.id),
                );
                image.final_image_path = Some(temp_path);
                ctx.persistence().update_generated_image(&image).ok();
            }
            None => {
                ctx.log(
                    LogLevel::Error,
                    "safety_reconcile",
                    format!("{} approved with neither final nor temp path, demoting to qc_failed", image.id),
                );
                ctx.persistence()
                    .update_qc_status(&image.id, QcStatus::QcFailed, &QcReason::QcInputPathMissing.to_string())
                    .ok();
            }
        }
    }
    Ok(())
}
