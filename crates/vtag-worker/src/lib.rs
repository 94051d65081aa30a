//! Video analysis worker.
//!
//! This crate provides:
//! - Configuration loaded from the environment
//! - The error taxonomy callers use to decide on retries
//! - The `AnalysisOrchestrator` composing resolution, upload, processing,
//!   generation, validation and persistence
//! - Retry, structured logging and metrics helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod retry;

pub use config::{WorkerConfig, DEFAULT_OUTPUT_PATH};
pub use error::{ErrorClass, WorkerError, WorkerResult};
pub use logging::AnalysisLogger;
pub use orchestrator::AnalysisOrchestrator;
pub use retry::{retry_async, RetryConfig, RetryResult, Retryable};
