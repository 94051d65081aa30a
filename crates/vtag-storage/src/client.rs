//! S3 client implementation.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::resolver::ObjectPresigner;

/// Configuration for the S3 client.
///
/// Every field is optional; unset values fall back to the AWS SDK's
/// default provider chain (environment, profile, instance metadata).
#[derive(Clone, Default)]
pub struct S3Config {
    /// Region override
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2)
    pub endpoint_url: Option<String>,
    /// Static access key ID
    pub access_key_id: Option<String>,
    /// Static secret access key
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("AWS_REGION").ok().filter(|s| !s.is_empty()),
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok().filter(|s| !s.is_empty()),
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// S3 storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = config.region {
            loader = loader.region(Region::new(region));
        }

        match (config.access_key_id, config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let credentials =
                    Credentials::new(access_key_id, secret_access_key, None, None, "vtag-static");
                loader = loader.credentials_provider(credentials);
            }
            (None, None) => {}
            _ => {
                return Err(StorageError::config_error(
                    "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
                ))
            }
        }

        let shared = loader.load().await;
        let mut builder = Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "S3 client initialized"
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl ObjectPresigner for S3Client {
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        debug!(bucket, key, "Checking object");

        self.client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let code = head_error_code(&e);
                StorageError::provider(code, DisplayErrorContext(&e).to_string())
            })?;

        Ok(())
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// Extract a provider error code from a HEAD failure.
///
/// HEAD responses carry no body, so the code is derived from the status
/// when the SDK does not supply one.
fn head_error_code(error: &SdkError<HeadObjectError, HttpResponse>) -> String {
    match error {
        SdkError::ServiceError(service) => {
            let err = service.err();
            if err.is_not_found() {
                return "NoSuchKey".to_string();
            }
            if let Some(code) = err.code() {
                return code.to_string();
            }
            match service.raw().status().as_u16() {
                403 => "AccessDenied".to_string(),
                404 => "NoSuchKey".to_string(),
                status => format!("Http{}", status),
            }
        }
        SdkError::TimeoutError(_) => "Timeout".to_string(),
        SdkError::DispatchFailure(_) => "DispatchFailure".to_string(),
        SdkError::ConstructionFailure(_) => "ConstructionFailure".to_string(),
        SdkError::ResponseError(_) => "ResponseError".to_string(),
        _ => "Unknown".to_string(),
    }
}
