//! Structured analysis logging.
//!
//! Every lifecycle event of one `analyze` call carries the same `run_id`
//! and source, so interleaved concurrent runs can be told apart.

use tracing::{error, info, Span};
use uuid::Uuid;
use vtag_models::VideoSource;

/// Logger bound to a single analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisLogger {
    run_id: String,
    source: String,
}

impl AnalysisLogger {
    /// Create a logger with a fresh run ID.
    pub fn new(source: &VideoSource) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            source: source.to_string(),
        }
    }

    pub fn log_start(&self) {
        info!(
            run_id = %self.run_id,
            source = %self.source,
            "Analysis started"
        );
    }

    /// Log completion of one pipeline stage.
    pub fn log_stage(&self, stage: &str, elapsed_ms: u64) {
        info!(
            run_id = %self.run_id,
            stage,
            elapsed_ms,
            "Stage finished"
        );
    }

    pub fn log_error(&self, kind: &str, message: &str) {
        error!(
            run_id = %self.run_id,
            source = %self.source,
            kind,
            "Analysis failed: {}", message
        );
    }

    pub fn log_completion(&self, category: &str, tags: usize) {
        info!(
            run_id = %self.run_id,
            source = %self.source,
            category,
            tags,
            "Analysis completed"
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "analysis",
            run_id = %self.run_id,
            source = %self.source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_creation() {
        let logger = AnalysisLogger::new(&VideoSource::remote("videos", "a.mp4"));

        assert_eq!(logger.source(), "s3://videos/a.mp4");
        assert!(Uuid::parse_str(logger.run_id()).is_ok());
    }

    #[test]
    fn test_run_ids_are_unique() {
        let source = VideoSource::local("clip.mp4");
        assert_ne!(
            AnalysisLogger::new(&source).run_id(),
            AnalysisLogger::new(&source).run_id()
        );
    }

    #[test]
    fn test_logging_methods_do_not_panic() {
        let logger = AnalysisLogger::new(&VideoSource::local("clip.mp4"));
        logger.log_start();
        logger.log_stage("resolve", 3);
        logger.log_error("processing", "failed");
        logger.log_completion("게임", 2);
        let _span = logger.create_span();
    }
}
