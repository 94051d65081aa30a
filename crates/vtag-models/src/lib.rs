//! Shared data models for the video tagging pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video source references and their persisted descriptors
//! - Signed access and resolved media references
//! - Remote (provider-side) file handles and their processing state
//! - Category sets and validated analysis results
//! - Result log records

pub mod analysis;
pub mod category;
pub mod record;
pub mod remote_file;
pub mod source;

// Re-export common types
pub use analysis::{AnalysisResult, ResultValidationError, MAX_TAGS, MIN_TAGS};
pub use category::{CategorySet, CategorySetError, DEFAULT_CATEGORIES};
pub use record::{AnalysisRecord, ResultLog};
pub use remote_file::{RemoteFileHandle, RemoteFileState};
pub use source::{SignedAccess, SourceDescriptor, UsableUri, VideoSource};
