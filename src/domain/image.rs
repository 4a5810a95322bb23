use serde::{Deserialize, Serialize};

/// QC state machine (spec §3). Transient: `Pending`, `Processing`,
/// `RetryPending`. Terminal: `Approved`, `RetryFailed`. `QcFailed` is
/// terminal-until-retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Pending,
    Processing,
    Approved,
    QcFailed,
    RetryPending,
    RetryFailed,
}

impl QcStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QcStatus::Approved | QcStatus::RetryFailed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFailure {
    pub stage: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub upload_tags: Option<Vec<String>>,
    pub failure: Option<ImageFailure>,
}

/// One row per image attempt. See spec §3 "GeneratedImage".
///
/// Invariant: `image_mapping_id` is set at creation and never rewritten —
/// it is the sole stable join key across retries and updates (numeric row
/// id, if a store assigns one, is an implementation detail).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    pub execution_id: String,
    pub image_mapping_id: String,
    pub generation_prompt: String,
    pub temp_image_path: Option<String>,
    pub final_image_path: Option<String>,
    pub qc_status: QcStatus,
    pub qc_reason: Option<String>,
    /// JSON snapshot of the processing config that produced or will produce
    /// this image. Retries with `use_original_settings=true` parse this;
    /// retries with modified settings never overwrite it (transient).
    pub processing_settings: serde_json::Value,
    pub metadata: ImageMetadata,
}

/// Strips MindJourney-style flags from a prompt before persistence (spec
/// §3, §8 invariant: `generationPrompt` must contain none of
/// `--v/--ar/--q/--seed/--style/--stylize`).
pub fn sanitize_generation_prompt(prompt: &str) -> String {
    static FLAG_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"(?i)--(v|ar|q|seed|style|stylize)\s+\S+").unwrap()
    });
    let stripped = FLAG_RE.replace_all(prompt, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_all_taxonomy_flags() {
        let prompt = "a fox in snow --v 6 --ar 16:9 --q 2 --seed 42 --style raw --stylize 250";
        let sanitized = sanitize_generation_prompt(prompt);
        for flag in ["--v", "--ar", "--q", "--seed", "--style", "--stylize"] {
            assert!(!sanitized.contains(flag), "leftover flag {flag} in {sanitized:?}");
        }
        assert_eq!(sanitized, "a fox in snow");
    }

    #[test]
    fn sanitize_leaves_plain_prompts_untouched() {
        assert_eq!(sanitize_generation_prompt("a red barn"), "a red barn");
    }
}
