//! Validated analysis results.
//!
//! [`AnalysisResult`] is the caller-facing contract:
//! `{summary: string, tags: string[1..4], category: string}`.
//! Field names and types must not change without a version marker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::CategorySet;

/// Minimum number of tags in a result.
pub const MIN_TAGS: usize = 1;

/// Maximum number of tags in a result.
pub const MAX_TAGS: usize = 4;

/// Reasons a result fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultValidationError {
    #[error("summary must be a non-empty string")]
    EmptySummary,

    #[error("tags must contain between 1 and 4 entries, got {0}")]
    TagCount(usize),

    #[error("tag at index {0} is empty")]
    EmptyTag(usize),

    #[error("category '{0}' is not in the configured category set")]
    UnknownCategory(String),
}

/// Structured output of one video analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// One to three sentence summary of the video
    pub summary: String,

    /// Core keywords, in order of relevance
    pub tags: Vec<String>,

    /// One entry of the configured category set
    pub category: String,
}

impl AnalysisResult {
    /// Build a result, validating it against `categories`.
    pub fn new(
        summary: impl Into<String>,
        tags: Vec<String>,
        category: impl Into<String>,
        categories: &CategorySet,
    ) -> Result<Self, ResultValidationError> {
        let result = Self {
            summary: summary.into(),
            tags,
            category: category.into(),
        };
        result.validate(categories)?;
        Ok(result)
    }

    /// Check the shape invariants and category membership.
    pub fn validate(&self, categories: &CategorySet) -> Result<(), ResultValidationError> {
        if self.summary.trim().is_empty() {
            return Err(ResultValidationError::EmptySummary);
        }

        if !(MIN_TAGS..=MAX_TAGS).contains(&self.tags.len()) {
            return Err(ResultValidationError::TagCount(self.tags.len()));
        }

        if let Some(index) = self.tags.iter().position(|t| t.trim().is_empty()) {
            return Err(ResultValidationError::EmptyTag(index));
        }

        if !categories.contains(&self.category) {
            return Err(ResultValidationError::UnknownCategory(self.category.clone()));
        }

        Ok(())
    }
}
