//! Failure Classifier (spec §4.4, §7): a pure mapping layer from raw stage
//! errors to the `qcReason` taxonomy, plus the soft/hard policy helper
//! shared by the Job Engine's QC/move pass and the Retry Executor's
//! `runPostProcessing`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing stages a post-processing failure can be attributed to.
/// `Convert`, `SaveFinal`, `Metadata`, `Trim`, `Enhancement` and
/// `RemoveBg` are the six stages selectable in `failOptions.steps` (spec
/// §4.2). `Qc` is not selectable there — it is only ever produced
/// internally as the unclassified fallback reason (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Convert,
    SaveFinal,
    Metadata,
    Trim,
    Enhancement,
    RemoveBg,
    Qc,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Convert => "convert",
            Stage::SaveFinal => "save_final",
            Stage::Metadata => "metadata",
            Stage::Trim => "trim",
            Stage::Enhancement => "enhancement",
            Stage::RemoveBg => "remove_bg",
            Stage::Qc => "qc",
        }
    }

    /// Maps a provider-supplied free-text stage label (e.g. from
    /// `ImageProviderResult::Partial`'s `FailedItem::stage`) back to a
    /// `Stage`, so a vendor-reported failure can be classified the same
    /// way an internally-raised `ProcessingStageError` is.
    pub fn from_label(label: &str) -> Option<Stage> {
        match label {
            "convert" => Some(Stage::Convert),
            "save_final" => Some(Stage::SaveFinal),
            "metadata" => Some(Stage::Metadata),
            "trim" => Some(Stage::Trim),
            "enhancement" => Some(Stage::Enhancement),
            "remove_bg" => Some(Stage::RemoveBg),
            "qc" => Some(Stage::Qc),
            _ => None,
        }
    }
}

/// The complete `qcReason` taxonomy (spec §7). `Display` produces exactly
/// the strings in the spec's table, so this type can be stored directly
/// as `GeneratedImage::qc_reason` via `.to_string()`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QcReason {
    #[error("processing_failed:{0}", .0.as_str())]
    ProcessingFailed(Stage),
    #[error("QC input path is missing")]
    QcInputPathMissing,
}

impl QcReason {
    pub fn for_stage(stage: Stage) -> Self {
        QcReason::ProcessingFailed(stage)
    }

    /// The unclassified fallback reason for a failure during the QC/move
    /// pass or a persistence write after I/O already succeeded (spec §7
    /// row `processing_failed:qc`).
    pub fn unclassified() -> Self {
        QcReason::ProcessingFailed(Stage::Qc)
    }

    /// Resolution order used by `processSingleImage` (spec §4.2 step 7):
    /// an explicit reason wins, otherwise map the raw stage, otherwise the
    /// unclassified sentinel.
    pub fn resolve(explicit: Option<QcReason>, stage: Option<Stage>) -> Self {
        explicit
            .or_else(|| stage.map(QcReason::for_stage))
            .unwrap_or_else(QcReason::unclassified)
    }
}

/// Decides whether a stage error is soft (image stays alive, falls back to
/// the input path) or hard (image marked `qc_failed`/`retry_failed` with a
/// specific reason), per the `failOptions` semantics in spec §4.2.
pub fn is_hard_failure(stage: Stage, fail_options: &crate::domain::FailOptions) -> bool {
    fail_options.is_hard(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailOptions;

    #[test]
    fn display_matches_spec_taxonomy_strings() {
        assert_eq!(
            QcReason::for_stage(Stage::Convert).to_string(),
            "processing_failed:convert"
        );
        assert_eq!(
            QcReason::for_stage(Stage::SaveFinal).to_string(),
            "processing_failed:save_final"
        );
        assert_eq!(
            QcReason::for_stage(Stage::RemoveBg).to_string(),
            "processing_failed:remove_bg"
        );
        assert_eq!(QcReason::unclassified().to_string(), "processing_failed:qc");
        assert_eq!(
            QcReason::QcInputPathMissing.to_string(),
            "QC input path is missing"
        );
    }

    #[test]
    fn fail_options_disabled_is_always_soft() {
        let opts = FailOptions {
            enabled: false,
            steps: vec![Stage::Convert],
        };
        assert!(!is_hard_failure(Stage::Convert, &opts));
    }

    #[test]
    fn fail_options_enabled_is_hard_only_for_listed_stages() {
        let opts = FailOptions {
            enabled: true,
            steps: vec![Stage::Convert, Stage::RemoveBg],
        };
        assert!(is_hard_failure(Stage::Convert, &opts));
        assert!(is_hard_failure(Stage::RemoveBg, &opts));
        assert!(!is_hard_failure(Stage::Trim, &opts));
    }

    #[test]
    fn resolve_prefers_explicit_reason_over_stage_mapping() {
        let resolved = QcReason::resolve(Some(QcReason::QcInputPathMissing), Some(Stage::Trim));
        assert_eq!(resolved, QcReason::QcInputPathMissing);
    }

    #[test]
    fn resolve_falls_back_to_unclassified_with_no_stage() {
        assert_eq!(QcReason::resolve(None, None), QcReason::unclassified());
    }
}
