//! Worker error types.
//!
//! Every stage error is translated into one [`WorkerError`] kind. Callers
//! decide on retries through [`WorkerError::class`].

use std::time::Duration;

use thiserror::Error;
use vtag_gemini::GeminiError;
use vtag_models::RemoteFileState;
use vtag_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Coarse retry bucket for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is wrong; retrying cannot help
    BadInput,
    /// Worth retrying, possibly after re-resolving the source
    Transient,
    /// The pipeline ran but the outcome will not change on retry
    Permanent,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{provider} provider error [{code}]: {message}")]
    Provider {
        provider: &'static str,
        code: String,
        message: String,
    },

    #[error("Signed URL expired before the media could be fetched")]
    SignedUrlExpired,

    #[error("Remote file processing failed (last state: {last_state})")]
    Processing { last_state: RemoteFileState },

    #[error("Remote file not active after {waited:?} (last state: {last_state})")]
    ProcessingTimeout {
        waited: Duration,
        last_state: RemoteFileState,
    },

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String, raw_text: String },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Storage codes that will not change on retry.
const PERMANENT_STORAGE_CODES: &[&str] = &[
    "NoSuchKey",
    "NoSuchBucket",
    "NotFound",
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
];

impl WorkerError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn provider(
        provider: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument(_) | Self::NotFound(_) | Self::Config(_) => ErrorClass::BadInput,
            Self::Provider { code, .. } => provider_class(code),
            Self::SignedUrlExpired | Self::ProcessingTimeout { .. } => ErrorClass::Transient,
            Self::Processing { .. }
            | Self::MalformedResponse { .. }
            | Self::Persistence(_)
            | Self::Cancelled => ErrorClass::Permanent,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Provider { .. } => "provider",
            Self::SignedUrlExpired => "signed_url_expired",
            Self::Processing { .. } => "processing",
            Self::ProcessingTimeout { .. } => "processing_timeout",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Persistence(_) => "persistence",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
        }
    }
}

fn provider_class(code: &str) -> ErrorClass {
    if PERMANENT_STORAGE_CODES.contains(&code) {
        return ErrorClass::Permanent;
    }

    let status = code
        .strip_prefix("Http")
        .unwrap_or(code)
        .parse::<u16>()
        .ok();
    match status {
        Some(408) | Some(429) => ErrorClass::Transient,
        Some(status) if (400..500).contains(&status) => ErrorClass::Permanent,
        _ => ErrorClass::Transient,
    }
}

impl From<StorageError> for WorkerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ConfigError(msg) => Self::Config(msg),
            StorageError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Provider { code, message } => Self::Provider {
                provider: "storage",
                code,
                message,
            },
            StorageError::PresignFailed(msg) => Self::provider("storage", "PresignFailed", msg),
            StorageError::Persistence(msg) => Self::Persistence(msg),
            StorageError::Io(e) => Self::Persistence(e.to_string()),
            StorageError::Json(e) => Self::Persistence(e.to_string()),
        }
    }
}

impl From<GeminiError> for WorkerError {
    fn from(e: GeminiError) -> Self {
        match e {
            GeminiError::ConfigError(msg) | GeminiError::InvalidTemplate(msg) => Self::Config(msg),
            GeminiError::RequestFailed(msg) => Self::provider("gemini", "RequestFailed", msg),
            GeminiError::Api { status, message } => {
                Self::provider("gemini", status.to_string(), message)
            }
            GeminiError::MediaFetch { status, message } => {
                Self::provider("storage", status.to_string(), message)
            }
            GeminiError::SignedUrlExpired => Self::SignedUrlExpired,
            GeminiError::Processing { last_state } => Self::Processing { last_state },
            GeminiError::ProcessingTimeout { waited, last_state } => {
                Self::ProcessingTimeout { waited, last_state }
            }
            GeminiError::FileNotActive(last_state) => Self::Processing { last_state },
            GeminiError::Cancelled => Self::Cancelled,
            GeminiError::InvalidProviderResponse { context, body } => {
                Self::provider("gemini", "InvalidResponse", format!("{}: {}", context, body))
            }
            GeminiError::MalformedResponse { reason, raw_text } => {
                Self::MalformedResponse { reason, raw_text }
            }
            GeminiError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::NotFound(e.to_string())
            }
            GeminiError::Io(e) => Self::provider("local", "Io", e.to_string()),
        }
    }
}
