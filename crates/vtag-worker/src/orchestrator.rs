//! Analysis orchestration.
//!
//! One `analyze` call runs resolve, register, wait, build, generate,
//! validate and store in sequence. Any stage failure aborts the call and
//! nothing is persisted; no partial result is ever returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::Instrument;
use vtag_gemini::{
    AnalysisRequestBuilder, GeminiClient, InferenceProvider, PollConfig, PromptTemplate,
    RemoteFileProcessor, ResponseValidator,
};
use vtag_models::{AnalysisRecord, AnalysisResult, CategorySet, VideoSource};
use vtag_storage::{ResultSink, S3Client, SourceResolver};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::AnalysisLogger;
use crate::metrics::{record_analysis, record_stage};
use crate::retry::{retry_async, RetryConfig};

/// Composes the pipeline stages into one call.
pub struct AnalysisOrchestrator {
    resolver: SourceResolver,
    provider: Arc<dyn InferenceProvider>,
    files: RemoteFileProcessor,
    builder: AnalysisRequestBuilder,
    validator: ResponseValidator,
    sink: Arc<dyn ResultSink>,
}

impl AnalysisOrchestrator {
    pub fn new(
        resolver: SourceResolver,
        provider: Arc<dyn InferenceProvider>,
        categories: CategorySet,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            resolver,
            files: RemoteFileProcessor::new(provider.clone(), PollConfig::default()),
            provider,
            builder: AnalysisRequestBuilder::default(),
            validator: ResponseValidator::new(categories),
            sink,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.files = RemoteFileProcessor::new(self.provider.clone(), poll);
        self
    }

    pub fn with_request_builder(mut self, builder: AnalysisRequestBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Wire up the production collaborators from configuration.
    pub async fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let provider: Arc<dyn InferenceProvider> =
            Arc::new(GeminiClient::new(config.gemini.clone())?);

        let store = S3Client::new(config.s3.clone()).await?;
        let resolver = SourceResolver::new(Arc::new(store))
            .with_ttl(config.presign_ttl)
            .with_object_verification(config.verify_remote_objects);

        let template = match &config.prompt_template {
            Some(path) => PromptTemplate::from_file(path).await?,
            None => PromptTemplate::default(),
        };
        let builder = AnalysisRequestBuilder::new(template).with_params(config.generation.clone());

        let sink = config.log_mode.open(config.output_path.clone());

        Ok(Self::new(resolver, provider, config.categories.clone(), sink)
            .with_poll_config(config.poll.clone())
            .with_request_builder(builder))
    }

    pub fn categories(&self) -> &CategorySet {
        self.validator.categories()
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    /// Analyze one video and persist the result.
    pub async fn analyze(&self, source: &VideoSource) -> WorkerResult<AnalysisResult> {
        self.analyze_with_cancel(source, None).await
    }

    /// Like [`analyze`](Self::analyze), aborting the in-flight stage with
    /// `Cancelled` once `cancel` flips to `true`.
    pub async fn analyze_with_cancel(
        &self,
        source: &VideoSource,
        cancel: Option<watch::Receiver<bool>>,
    ) -> WorkerResult<AnalysisResult> {
        let logger = AnalysisLogger::new(source);
        let span = logger.create_span();

        let outcome = self.run(source, cancel, &logger).instrument(span).await;

        match &outcome {
            Ok(result) => {
                record_analysis("success");
                logger.log_completion(&result.category, result.tags.len());
            }
            Err(e) => {
                record_analysis(e.kind());
                logger.log_error(e.kind(), &e.to_string());
            }
        }
        outcome
    }

    /// Analyze with caller-side retries of transient failures.
    ///
    /// Each attempt starts from resolution, so an expired signed URL is
    /// replaced by a fresh one.
    pub async fn analyze_with_retry(
        &self,
        source: &VideoSource,
        retry: &RetryConfig,
    ) -> WorkerResult<AnalysisResult> {
        retry_async(retry, || self.analyze(source)).await.into_result()
    }

    async fn run(
        &self,
        source: &VideoSource,
        cancel: Option<watch::Receiver<bool>>,
        logger: &AnalysisLogger,
    ) -> WorkerResult<AnalysisResult> {
        logger.log_start();

        let started = Instant::now();
        let media = with_cancel(self.resolver.resolve(source), cancel.as_ref()).await?;
        finish_stage(logger, "resolve", started);

        let started = Instant::now();
        let handle = with_cancel(self.files.register(&media), cancel.as_ref()).await?;
        finish_stage(logger, "upload", started);

        let started = Instant::now();
        let handle = self.files.wait_until_active(handle, cancel.clone()).await?;
        finish_stage(logger, "processing", started);

        let request = self.builder.build(&handle, self.validator.categories())?;

        let started = Instant::now();
        let raw_text = with_cancel(self.provider.generate_content(&request), cancel.as_ref()).await?;
        finish_stage(logger, "generate", started);

        let result = self.validator.parse(&raw_text)?;

        let started = Instant::now();
        let record = AnalysisRecord::new(source, result.clone());
        self.sink.append(&record).await?;
        finish_stage(logger, "store", started);

        Ok(result)
    }
}

fn finish_stage(logger: &AnalysisLogger, stage: &'static str, started: Instant) {
    let elapsed = started.elapsed();
    record_stage(stage, elapsed);
    logger.log_stage(stage, elapsed.as_millis() as u64);
}

/// Run `stage`, failing with `Cancelled` if `cancel` flips first.
async fn with_cancel<T, E, F>(stage: F, cancel: Option<&watch::Receiver<bool>>) -> WorkerResult<T>
where
    F: Future<Output = Result<T, E>>,
    WorkerError: From<E>,
{
    let Some(cancel) = cancel else {
        return Ok(stage.await?);
    };

    let mut cancel = cancel.clone();
    if *cancel.borrow_and_update() {
        return Err(WorkerError::Cancelled);
    }

    tokio::select! {
        result = stage => Ok(result?),
        _ = cancelled(&mut cancel) => Err(WorkerError::Cancelled),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        // Sender dropped; cancellation can no longer arrive.
        std::future::pending::<()>().await;
    }
}
