//! Inference provider seam.

use async_trait::async_trait;
use vtag_models::{RemoteFileHandle, UsableUri};

use crate::error::GeminiResult;
use crate::prompt::AnalysisRequest;

/// Remote multimodal inference service.
///
/// [`crate::GeminiClient`] is the production implementation; the pipeline
/// only depends on this trait.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Upload or register media and return the provider's handle.
    async fn upload_media(&self, media: &UsableUri) -> GeminiResult<RemoteFileHandle>;

    /// Fetch the latest view of a previously uploaded file.
    async fn get_file(&self, id: &str) -> GeminiResult<RemoteFileHandle>;

    /// Run generation and return the raw model text.
    async fn generate_content(&self, request: &AnalysisRequest) -> GeminiResult<String>;
}
