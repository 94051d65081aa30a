//! Gemini integration for video analysis.
//!
//! This crate provides:
//! - A REST client for the Gemini Files API and `generateContent`
//! - The [`InferenceProvider`] seam the pipeline is written against
//! - Remote file registration and the processing-state wait loop
//! - Prompt templating and request construction
//! - Strict validation of the model's JSON output

pub mod client;
pub mod error;
pub mod files;
pub mod media;
pub mod prompt;
pub mod provider;
pub mod response;

pub use client::{GeminiClient, GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{GeminiError, GeminiResult};
pub use files::{PollConfig, RemoteFileProcessor};
pub use prompt::{
    AnalysisRequest, AnalysisRequestBuilder, FewShotExample, GenerationParams, PromptTemplate,
    RequestPart,
};
pub use provider::InferenceProvider;
pub use response::ResponseValidator;
