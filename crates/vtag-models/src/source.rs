//! Video source references.
//!
//! A [`VideoSource`] names exactly one video for one analysis call. It is
//! resolved into a [`UsableUri`] the inference provider can fetch: either the
//! local path itself or a time-limited [`SignedAccess`] URL.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A reference to the video to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VideoSource {
    /// A file on the local filesystem.
    Local { path: PathBuf },
    /// An object in an S3-compatible bucket.
    Remote { bucket: String, key: String },
}

impl VideoSource {
    /// Create a local file source.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Create a remote object source.
    pub fn remote(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Remote {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Descriptor persisted alongside each analysis record.
    pub fn descriptor(&self) -> SourceDescriptor {
        match self {
            Self::Local { path } => SourceDescriptor::Local {
                file_path: path.to_string_lossy().into_owned(),
            },
            Self::Remote { bucket, key } => SourceDescriptor::S3 {
                bucket: bucket.clone(),
                key: key.clone(),
                s3_uri: format!("s3://{}/{}", bucket, key),
            },
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Remote { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// Persisted form of a [`VideoSource`] in the result log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Local {
        file_path: String,
    },
    S3 {
        bucket: String,
        key: String,
        s3_uri: String,
    },
}

/// A time-limited, credential-free URL for one storage object.
///
/// Never persisted. The query string carries the signature, so only
/// [`SignedAccess::redacted`] should reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedAccess {
    pub uri: String,
    pub expires_at: DateTime<Utc>,
}

impl SignedAccess {
    pub fn new(uri: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            expires_at,
        }
    }

    /// Returns true once the validity window has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The URL without its query string and fragment.
    pub fn redacted(&self) -> String {
        match url::Url::parse(&self.uri) {
            Ok(mut parsed) => {
                parsed.set_query(None);
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => "<unparseable signed url>".to_string(),
        }
    }
}

impl fmt::Debug for SignedAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedAccess")
            .field("uri", &self.redacted())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A fetchable reference produced by source resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsableUri {
    /// Local path, uploaded directly.
    Path(PathBuf),
    /// Signed URL for a remote object.
    Signed(SignedAccess),
}

impl UsableUri {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Signed(_) => None,
        }
    }

    /// Loggable form of the reference.
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Signed(access) => access.redacted(),
        }
    }
}
