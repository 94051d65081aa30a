//! Storage for the video tagging pipeline.
//!
//! This crate provides:
//! - S3-compatible client (object existence checks, presigned GET URLs)
//! - Source resolution from a `VideoSource` to a fetchable reference
//! - Result log persistence (snapshot JSON or JSON-lines)

pub mod client;
pub mod error;
pub mod resolver;
pub mod result_log;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use resolver::{ObjectPresigner, SourceResolver, DEFAULT_PRESIGN_TTL};
pub use result_log::{JsonLinesResultLog, JsonResultLog, LogMode, ResultSink};
