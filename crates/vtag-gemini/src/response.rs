//! Model response validation.

use serde_json::{Map, Value};
use tracing::warn;
use vtag_models::{AnalysisResult, CategorySet};

use crate::error::{GeminiError, GeminiResult};

/// Parses raw model text into a validated [`AnalysisResult`].
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    categories: CategorySet,
}

impl ResponseValidator {
    pub fn new(categories: CategorySet) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Parse and validate `raw_text`.
    ///
    /// Failures carry the original, unstripped text. Extra JSON fields are
    /// ignored; category matching is exact.
    pub fn parse(&self, raw_text: &str) -> GeminiResult<AnalysisResult> {
        let cleaned = strip_code_fence(raw_text);

        let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
            warn!(error = %e, "Model response is not valid JSON");
            GeminiError::malformed(format!("invalid JSON: {}", e), raw_text)
        })?;

        let object = value
            .as_object()
            .ok_or_else(|| GeminiError::malformed("response is not a JSON object", raw_text))?;

        let result = AnalysisResult {
            summary: string_field(object, "summary", raw_text)?,
            tags: tags_field(object, raw_text)?,
            category: string_field(object, "category", raw_text)?,
        };

        result
            .validate(&self.categories)
            .map_err(|e| GeminiError::malformed(e.to_string(), raw_text))?;

        Ok(result)
    }
}

/// Drop the first and last lines when the text is wrapped in a code fence.
fn strip_code_fence(raw_text: &str) -> String {
    let trimmed = raw_text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let lines: Vec<&str> = trimmed.split('\n').collect();
    if lines.len() < 2 {
        return String::new();
    }
    lines[1..lines.len() - 1].join("\n")
}

fn string_field(object: &Map<String, Value>, name: &str, raw_text: &str) -> GeminiResult<String> {
    match object.get(name) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(GeminiError::malformed(
            format!("field '{}' must be a string", name),
            raw_text,
        )),
        None => Err(GeminiError::malformed(
            format!("missing field '{}'", name),
            raw_text,
        )),
    }
}

fn tags_field(object: &Map<String, Value>, raw_text: &str) -> GeminiResult<Vec<String>> {
    let items = match object.get("tags") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(GeminiError::malformed("field 'tags' must be an array", raw_text)),
        None => return Err(GeminiError::malformed("missing field 'tags'", raw_text)),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(tag) => Ok(tag.clone()),
            _ => Err(GeminiError::malformed(
                format!("tag at index {} must be a string", index),
                raw_text,
            )),
        })
        .collect()
}
