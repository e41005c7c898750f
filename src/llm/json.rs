//! Locating a single JSON object inside free-form model output.
//!
//! Models wrap answers in code fences or add a sentence before and after
//! the object. Extraction strips fences, tries the whole text, then falls
//! back to the span between the first `{` and the last `}`.

use serde_json::Value;
use thiserror::Error;

const PREVIEW_CHARS: usize = 300;

/// Failure to read a JSON object out of a model response.
#[derive(Debug, Error)]
pub enum JsonExtractError {
    #[error("no JSON object found in response: {preview}")]
    NoObject { preview: String },

    #[error("response JSON is not an object: {preview}")]
    NotAnObject { preview: String },

    #[error("malformed JSON object ({reason}): {preview}")]
    Malformed { reason: String, preview: String },
}

/// Extract the JSON object embedded in `raw`.
pub fn extract_json(raw: &str) -> Result<Value, JsonExtractError> {
    let cleaned = strip_code_fences(raw);
    let cleaned = cleaned.trim();

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return if value.is_object() {
            Ok(value)
        } else {
            Err(JsonExtractError::NotAnObject {
                preview: preview(raw),
            })
        };
    }

    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(JsonExtractError::NoObject {
                preview: preview(raw),
            })
        }
    };

    serde_json::from_str::<Value>(&cleaned[start..=end]).map_err(|e| JsonExtractError::Malformed {
        reason: e.to_string(),
        preview: preview(raw),
    })
}

/// Remove Markdown code fence markers (with or without a language tag).
fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("```") {
                // Drop the fence and an optional language tag.
                rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(raw: &str) -> String {
    let mut preview: String = raw.chars().take(PREVIEW_CHARS).collect();
    if raw.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
