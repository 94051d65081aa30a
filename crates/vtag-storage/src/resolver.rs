//! Source resolution.
//!
//! Turns a [`VideoSource`] into a single [`UsableUri`] the inference
//! provider can consume:
//! - `Local` sources are checked for existence and readability and returned
//!   as-is, without any network call.
//! - `Remote` sources get a presigned GET URL with a fixed validity window.
//!   The window must outlive upload plus provider-side processing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use vtag_models::{SignedAccess, UsableUri, VideoSource};

use crate::error::{StorageError, StorageResult};

/// Default validity window for presigned URLs (2 hours).
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(7200);

/// Object store operations needed to hand out signed read access.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectPresigner: Send + Sync {
    /// Fail with a provider error code if the object is missing or denied.
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Generate a presigned GET URL valid for `expires_in`.
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration)
        -> StorageResult<String>;
}

/// Resolves video sources into fetchable references.
#[derive(Clone)]
pub struct SourceResolver {
    store: Option<Arc<dyn ObjectPresigner>>,
    ttl: Duration,
    verify_objects: bool,
}

impl SourceResolver {
    /// Resolver that can only handle local sources.
    pub fn local_only() -> Self {
        Self {
            store: None,
            ttl: DEFAULT_PRESIGN_TTL,
            verify_objects: true,
        }
    }

    /// Resolver backed by an object store for remote sources.
    pub fn new(store: Arc<dyn ObjectPresigner>) -> Self {
        Self {
            store: Some(store),
            ..Self::local_only()
        }
    }

    /// Set the presigned URL validity window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Check object existence before signing (default: on).
    pub fn with_object_verification(mut self, verify: bool) -> Self {
        self.verify_objects = verify;
        self
    }

    /// Resolve a source into a usable reference.
    pub async fn resolve(&self, source: &VideoSource) -> StorageResult<UsableUri> {
        match source {
            VideoSource::Local { path } => self.resolve_local(path).await,
            VideoSource::Remote { bucket, key } => self.resolve_remote(bucket, key).await,
        }
    }

    async fn resolve_local(&self, path: &Path) -> StorageResult<UsableUri> {
        if path.as_os_str().is_empty() {
            return Err(StorageError::invalid_argument("local path must not be empty"));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::not_found(format!("{}: {}", path.display(), e)))?;

        if !metadata.is_file() {
            return Err(StorageError::invalid_argument(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        // Opening proves readability without reading the video.
        tokio::fs::File::open(path).await.map_err(|e| {
            StorageError::not_found(format!("{} is not readable: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "Resolved local source");
        Ok(UsableUri::Path(path.to_path_buf()))
    }

    async fn resolve_remote(&self, bucket: &str, key: &str) -> StorageResult<UsableUri> {
        if bucket.trim().is_empty() || key.trim().is_empty() {
            return Err(StorageError::invalid_argument(
                "bucket and key are both required for remote sources",
            ));
        }

        if self.ttl.is_zero() {
            return Err(StorageError::invalid_argument(
                "presigned URL validity window must be positive",
            ));
        }

        let store = self.store.as_ref().ok_or_else(|| {
            StorageError::config_error("no object store configured for remote sources")
        })?;

        if self.verify_objects {
            store.head_object(bucket, key).await.map_err(|e| {
                warn!(bucket, key, error = %e, "Remote object check failed");
                e
            })?;
        }

        info!(
            bucket,
            key,
            ttl_secs = self.ttl.as_secs(),
            "Generating presigned URL"
        );

        let issued_at = Utc::now();
        let uri = store.presign_get(bucket, key, self.ttl).await?;
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| StorageError::invalid_argument(format!("ttl out of range: {}", e)))?;

        Ok(UsableUri::Signed(SignedAccess::new(uri, issued_at + ttl)))
    }
}
