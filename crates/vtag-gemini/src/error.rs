//! Gemini error types.

use std::time::Duration;

use thiserror::Error;
use vtag_models::RemoteFileState;

const MAX_BODY_SNIPPET: usize = 512;

pub type GeminiResult<T> = Result<T, GeminiError>;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Gemini request failed: {0}")]
    RequestFailed(String),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Media fetch failed with status {status}: {message}")]
    MediaFetch { status: u16, message: String },

    #[error("Signed URL expired before the media could be fetched")]
    SignedUrlExpired,

    #[error("Remote file processing failed (last state: {last_state})")]
    Processing { last_state: RemoteFileState },

    #[error("Remote file not active after {waited:?} (last state: {last_state})")]
    ProcessingTimeout {
        waited: Duration,
        last_state: RemoteFileState,
    },

    #[error("Remote file is not active (state: {0})")]
    FileNotActive(RemoteFileState),

    #[error("Cancelled while waiting for remote file")]
    Cancelled,

    #[error("Unreadable provider response ({context})")]
    InvalidProviderResponse { context: String, body: String },

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String, raw_text: String },

    #[error("Invalid prompt template: {0}")]
    InvalidTemplate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeminiError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn malformed(reason: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw_text: raw_text.into(),
        }
    }

    /// Provider envelope that could not be decoded. Keeps the head of the
    /// body for diagnostics.
    pub fn invalid_provider_response(context: impl Into<String>, body: &str) -> Self {
        Self::InvalidProviderResponse {
            context: context.into(),
            body: body.chars().take(MAX_BODY_SNIPPET).collect(),
        }
    }

    /// HTTP status reported by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::MediaFetch { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        // Strip the URL; upload session URLs carry credentials.
        Self::RequestFailed(e.without_url().to_string())
    }
}
