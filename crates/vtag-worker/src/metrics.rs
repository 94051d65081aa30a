//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Completed analyses by outcome (`success` or an error kind).
    pub const ANALYSES_TOTAL: &str = "vtag_analyses_total";

    /// Stage latency in seconds by stage.
    pub const STAGE_LATENCY_SECONDS: &str = "vtag_stage_latency_seconds";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "vtag_retries_total";

    /// File-state polls (recorded inside the Gemini crate).
    pub use vtag_gemini::files::FILE_POLLS_TOTAL;
}

/// Record the outcome of one analysis.
pub fn record_analysis(outcome: &str) {
    counter!(
        names::ANALYSES_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record how long a stage took.
pub fn record_stage(stage: &'static str, elapsed: Duration) {
    histogram!(
        names::STAGE_LATENCY_SECONDS,
        "stage" => stage
    )
    .record(elapsed.as_secs_f64());
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}
