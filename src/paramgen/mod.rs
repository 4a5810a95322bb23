//! Prompt/Parameter Generator (spec §4.5): turns a configuration's keyword
//! file and system prompt into the [`GenerationParameters`] an
//! `ImageProvider` call needs, choosing one keyword row per generation and
//! normalizing the aspect ratio list from a dimension CSV.

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use crate::domain::Parameters;
use crate::engine::cancellation::AbortSignal;
use crate::providers::{GenerationParameters, VisionProvider};

/// Reads a keyword file (CSV/TSV with header, or one keyword per line) and
/// returns every row as a generic JSON value: an array of strings for a
/// plain list, or an array of objects when the file carries a header row.
pub fn load_keywords(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path)?;
    let lines: Vec<&str> = raw.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let delimiter = if lines[0].contains('\t') { '\t' } else { ',' };
    if lines[0].contains(delimiter) {
        let header: Vec<&str> = lines[0].split(delimiter).map(str::trim).collect();
        let rows = lines[1..]
            .iter()
            .map(|line| {
                let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
                let mut obj = serde_json::Map::new();
                for (i, key) in header.iter().enumerate() {
                    obj.insert((*key).to_string(), Value::String(cells.get(i).copied().unwrap_or("").to_string()));
                }
                Value::Object(obj)
            })
            .collect();
        return Ok(rows);
    }

    Ok(lines.into_iter().map(|line| Value::String(line.to_string())).collect())
}

/// Picks one keyword row for a given generation index, either uniformly at
/// random or deterministically via `generation_index mod rows.len()` when
/// `keyword_random` is disabled (the `__forceSequentialIndex` behavior).
pub fn select_keyword(rows: &[Value], generation_index: usize, random: bool) -> Option<Value> {
    if rows.is_empty() {
        return None;
    }
    let index = if random {
        let seed = (generation_index as u64)
            .wrapping_mul(2_654_435_761)
            .wrapping_add(std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos() as u64)
                .unwrap_or(0));
        (seed as usize) % rows.len()
    } else {
        generation_index % rows.len()
    };
    rows.get(index).cloned()
}

/// Reads an optional prompt file, swallowing any I/O error — a missing or
/// unreadable system/QC/metadata prompt file silently disables that
/// feature rather than failing the job (spec §8 scenario "prompt file
/// missing is swallowed, not fatal").
pub fn read_prompt_file_lenient(path: Option<&str>) -> Option<String> {
    let path = path?;
    fs::read_to_string(path).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Splits a `dimension_csv` such as `"1024x1024,1536x1024"` into an
/// aspect-ratio list an `ImageProvider` understands.
pub fn normalize_aspect_ratios(dimension_csv: &str) -> Vec<String> {
    dimension_csv
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize_one_dimension)
        .collect()
}

fn normalize_one_dimension(dimension: &str) -> String {
    let Some((w, h)) = dimension.split_once(['x', 'X']) else {
        return dimension.to_string();
    };
    let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>()) else {
        return dimension.to_string();
    };
    let divisor = gcd(w, h).max(1);
    format!("{}:{}", w / divisor, h / divisor)
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Clamps requested variations per spec §8 boundary behavior: at most
/// `floor(10000 / generations)` and never more than 20.
pub fn clamp_variations(requested: u32, generations: u32) -> u32 {
    let generations = generations.max(1);
    let budget_cap = 10_000 / generations;
    requested.min(budget_cap).min(20).max(1)
}

pub fn generate_parameters_for_row(
    vision: &dyn VisionProvider,
    keyword: &Value,
    params: &Parameters,
    system_prompt: Option<&str>,
    keyword_file_path: Option<&str>,
    signal: &AbortSignal,
) -> Result<GenerationParameters> {
    let mj_version = "6".to_string();
    let mut generated = vision.generate_parameters(
        keyword,
        system_prompt,
        keyword_file_path,
        &mj_version,
        &params.openai_model,
        signal,
    )?;
    generated.prompt = crate::domain::sanitize_generation_prompt(&generated.prompt);
    if generated.aspect_ratios.is_empty() {
        generated.aspect_ratios = normalize_aspect_ratios(&params.dimension_csv);
    }
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_both_caps() {
        assert_eq!(clamp_variations(50, 1000), 10);
        assert_eq!(clamp_variations(20, 1), 20);
    }

    #[test]
    fn sequential_selection_wraps_with_modulo() {
        let rows = vec![Value::String("a".into()), Value::String("b".into())];
        assert_eq!(select_keyword(&rows, 2, false), Some(Value::String("a".into())));
        assert_eq!(select_keyword(&rows, 3, false), Some(Value::String("b".into())));
    }

    #[test]
    fn normalizes_dimension_csv_into_aspect_ratios() {
        assert_eq!(normalize_aspect_ratios("1024x1024,1536x1024"), vec!["1:1", "3:2"]);
    }

    #[test]
    fn missing_prompt_file_is_swallowed() {
        assert_eq!(read_prompt_file_lenient(Some("/nonexistent/path/should/not/exist.txt")), None);
    }
}
