//! Closed category enumeration for analysis results.

use thiserror::Error;

/// Categories used when none are configured.
pub const DEFAULT_CATEGORIES: [&str; 7] = [
    "저스트채팅",
    "게임",
    "스포츠",
    "요리",
    "미술",
    "음악",
    "교육",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategorySetError {
    #[error("category set must not be empty")]
    Empty,

    #[error("category names must not be blank")]
    BlankEntry,
}

/// The fixed set of permissible `category` values.
///
/// Order is preserved for prompt rendering; duplicates are dropped.
/// Membership is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    entries: Vec<String>,
}

impl CategorySet {
    pub fn new<I, S>(entries: I) -> Result<Self, CategorySetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.into();
            if entry.trim().is_empty() {
                return Err(CategorySetError::BlankEntry);
            }
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }

        if unique.is_empty() {
            return Err(CategorySetError::Empty);
        }

        Ok(Self { entries: unique })
    }

    /// Parse a comma-separated list (`"게임, 요리"`), trimming each entry.
    pub fn parse_list(list: &str) -> Result<Self, CategorySetError> {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )
    }

    pub fn contains(&self, category: &str) -> bool {
        self.entries.iter().any(|c| c == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verbatim enumeration for prompt text: `a, b, c`.
    pub fn render(&self) -> String {
        self.entries.join(", ")
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}
