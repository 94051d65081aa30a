//! Gemini REST client.
//!
//! Media goes through the Files API resumable upload (start, then a single
//! `upload, finalize` call). Local files stream from disk; signed URLs are
//! fetched and streamed straight through without touching disk.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vtag_models::{RemoteFileHandle, RemoteFileState, SignedAccess, UsableUri};

use crate::error::{GeminiError, GeminiResult};
use crate::media::{guess_mime_type, resolve_mime_type};
use crate::prompt::{AnalysisRequest, GenerationParams, RequestPart};
use crate::provider::InferenceProvider;

pub const DEFAULT_MODEL: &str = "gemini-flash-lite-latest";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Gemini client configuration.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Timeout for metadata and generation calls (uploads are unbounded)
    pub request_timeout: Duration,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Load from `GEMINI_API_KEY`, `GEMINI_MODEL` and `GEMINI_BASE_URL`.
    pub fn from_env() -> GeminiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GeminiError::config_error("GEMINI_API_KEY not set"))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        if let Ok(base_url) = std::env::var("GEMINI_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url;
            }
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// File resource as returned by the Files API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: Option<String>,
}

impl FileResource {
    fn into_handle(self, fallback_mime: &str) -> RemoteFileHandle {
        let mime_type = if self.mime_type.is_empty() {
            fallback_mime.to_string()
        } else {
            self.mime_type
        };
        RemoteFileHandle {
            id: self.name,
            uri: self.uri,
            mime_type,
            state: RemoteFileState::from_provider(self.state.as_deref().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Debug, Serialize)]
struct StartUpload<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Debug, Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

impl<'a> From<&'a RequestPart> for WirePart<'a> {
    fn from(part: &'a RequestPart) -> Self {
        match part {
            RequestPart::Media {
                file_uri,
                mime_type,
            } => WirePart::File {
                file_data: FileData {
                    mime_type,
                    file_uri,
                },
            },
            RequestPart::Text(text) => WirePart::Text { text },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Media ready to be sent in the upload call.
struct MediaBody {
    body: Body,
    length: u64,
    mime_type: String,
    display_name: String,
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> GeminiResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GeminiError::config_error("Gemini API key must not be empty"));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GeminiError::config_error(format!("HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn local_body(&self, path: &Path) -> GeminiResult<MediaBody> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let name = path.to_string_lossy();

        Ok(MediaBody {
            body: Body::from(file),
            length,
            mime_type: guess_mime_type(&name).to_string(),
            display_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.into_owned()),
        })
    }

    async fn remote_body(&self, access: &SignedAccess) -> GeminiResult<MediaBody> {
        if access.is_expired() {
            return Err(GeminiError::SignedUrlExpired);
        }

        debug!(uri = %access.redacted(), "Fetching media from signed URL");
        let response = self.http.get(&access.uri).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status == StatusCode::FORBIDDEN && is_expiry_message(&text) {
                warn!(uri = %access.redacted(), "Signed URL rejected as expired");
                return Err(GeminiError::SignedUrlExpired);
            }
            return Err(GeminiError::MediaFetch {
                status: status.as_u16(),
                message: text,
            });
        }

        let object_path = url::Url::parse(&access.uri)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let display_name = object_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("video")
            .to_string();
        let reported = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mime_type = resolve_mime_type(reported.as_deref(), &object_path);

        let (body, length) = match response.content_length() {
            Some(length) => (Body::wrap_stream(response.bytes_stream()), length),
            None => {
                let bytes = response.bytes().await?;
                let length = bytes.len() as u64;
                (Body::from(bytes), length)
            }
        };

        Ok(MediaBody {
            body,
            length,
            mime_type,
            display_name,
        })
    }

    async fn start_upload(&self, media: &MediaBody) -> GeminiResult<String> {
        let response = self
            .http
            .post(self.endpoint("upload/v1beta/files"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", media.length.to_string())
            .header("X-Goog-Upload-Header-Content-Type", &media.mime_type)
            .timeout(self.config.request_timeout)
            .json(&StartUpload {
                file: StartUploadFile {
                    display_name: &media.display_name,
                },
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GeminiError::request_failed("upload session URL missing from response"))
    }
}

/// Turn a non-success response into `GeminiError::Api`.
async fn check_status(response: Response) -> GeminiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(GeminiError::Api {
        status: status.as_u16(),
        message,
    })
}

fn is_expiry_message(body: &str) -> bool {
    body.contains("Request has expired") || body.contains("ExpiredToken")
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    async fn upload_media(&self, media: &UsableUri) -> GeminiResult<RemoteFileHandle> {
        let body = match media {
            UsableUri::Path(path) => self.local_body(path).await?,
            UsableUri::Signed(access) => self.remote_body(access).await?,
        };

        let upload_url = self.start_upload(&body).await?;
        debug!(
            bytes = body.length,
            mime_type = %body.mime_type,
            "Upload session started"
        );

        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header(reqwest::header::CONTENT_LENGTH, body.length.to_string())
            .body(body.body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let raw = response.text().await?;
        let uploaded: UploadResponse = serde_json::from_str(&raw)
            .map_err(|e| GeminiError::invalid_provider_response(format!("upload response: {}", e), &raw))?;

        let handle = uploaded.file.into_handle(&body.mime_type);
        info!(file_id = %handle.id, state = %handle.state, "Gemini file created");
        Ok(handle)
    }

    async fn get_file(&self, id: &str) -> GeminiResult<RemoteFileHandle> {
        let response = self
            .http
            .get(self.endpoint(&format!("v1beta/{}", id)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;

        let raw = response.text().await?;
        let resource: FileResource = serde_json::from_str(&raw)
            .map_err(|e| GeminiError::invalid_provider_response(format!("file resource: {}", e), &raw))?;

        Ok(resource.into_handle(crate::media::FALLBACK_VIDEO_MIME))
    }

    async fn generate_content(&self, request: &AnalysisRequest) -> GeminiResult<String> {
        let url = self.endpoint(&format!(
            "v1beta/models/{}:generateContent",
            self.config.model
        ));

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: request.parts.iter().map(WirePart::from).collect(),
            }],
            generation_config: &request.generation,
        };

        info!(model = %self.config.model, "Calling Gemini generateContent");
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let raw = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&raw).map_err(|e| {
            GeminiError::invalid_provider_response(format!("generateContent response: {}", e), &raw)
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GeminiError::malformed("no text in model response", raw));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig::new("test-key").with_base_url(server.uri());
        GeminiClient::new(config).unwrap()
    }

    async fn mount_upload(server: &MockServer, content_length: &str, content_type: &str) {
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("x-goog-api-key", "test-key"))
            .and(header("x-goog-upload-command", "start"))
            .and(header("x-goog-upload-header-content-length", content_length))
            .and(header("x-goog-upload-header-content-type", content_type))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(UPLOAD_URL_HEADER, format!("{}/upload-session/1", server.uri()).as_str()),
            )
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc123",
                    "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                    "mimeType": "video/mp4",
                    "state": "PROCESSING"
                }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = GeminiConfig::new("super-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains(DEFAULT_MODEL));
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("  ")),
            Err(GeminiError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_local_file() {
        let server = MockServer::start().await;
        mount_upload(&server, "1024", "video/mp4").await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        tokio::fs::write(&file, vec![0u8; 1024]).await.unwrap();

        let handle = client(&server)
            .upload_media(&UsableUri::Path(file))
            .await
            .unwrap();

        assert_eq!(handle.id, "files/abc123");
        assert_eq!(handle.state, RemoteFileState::Processing);

        let requests = server.received_requests().await.unwrap();
        let start = &requests[0];
        let start_body: serde_json::Value = serde_json::from_slice(&start.body).unwrap();
        assert_eq!(start_body["file"]["display_name"], "clip.mp4");
        assert_eq!(requests[1].body.len(), 1024);
    }

    #[tokio::test]
    async fn test_unreadable_upload_envelope_is_a_provider_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(UPLOAD_URL_HEADER, format!("{}/upload-session/1", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload-session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        tokio::fs::write(&file, vec![0u8; 16]).await.unwrap();

        let err = client(&server)
            .upload_media(&UsableUri::Path(file))
            .await
            .unwrap_err();

        match err {
            GeminiError::InvalidProviderResponse { context, body } => {
                assert!(context.starts_with("upload response"));
                assert_eq!(body, "{}");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_streams_signed_url() {
        let server = MockServer::start().await;
        mount_upload(&server, "256", "video/webm").await;

        Mock::given(method("GET"))
            .and(path("/bucket/video.webm"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/webm")
                    .set_body_bytes(vec![7u8; 256]),
            )
            .mount(&server)
            .await;

        let access = SignedAccess::new(
            format!("{}/bucket/video.webm?X-Amz-Signature=abc", server.uri()),
            Utc::now() + ChronoDuration::hours(2),
        );
        client(&server)
            .upload_media(&UsableUri::Signed(access))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let finalize = requests
            .iter()
            .find(|r| r.url.path() == "/upload-session/1")
            .unwrap();
        assert_eq!(finalize.body, vec![7u8; 256]);
    }

    #[tokio::test]
    async fn test_expired_signed_url_is_not_fetched() {
        let server = MockServer::start().await;
        let access = SignedAccess::new(
            format!("{}/bucket/video.mp4?sig=1", server.uri()),
            Utc::now() - ChronoDuration::seconds(1),
        );

        let err = client(&server)
            .upload_media(&UsableUri::Signed(access))
            .await
            .unwrap_err();

        assert!(matches!(err, GeminiError::SignedUrlExpired));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_rejecting_expired_signature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/video.mp4"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>",
            ))
            .mount(&server)
            .await;

        let access = SignedAccess::new(
            format!("{}/bucket/video.mp4?sig=1", server.uri()),
            Utc::now() + ChronoDuration::hours(1),
        );
        let err = client(&server)
            .upload_media(&UsableUri::Signed(access))
            .await
            .unwrap_err();

        assert!(matches!(err, GeminiError::SignedUrlExpired));
    }

    #[tokio::test]
    async fn test_media_fetch_failure_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/video.mp4"))
            .respond_with(ResponseTemplate::new(404).set_body_string("NoSuchKey"))
            .mount(&server)
            .await;

        let access = SignedAccess::new(
            format!("{}/bucket/video.mp4?sig=1", server.uri()),
            Utc::now() + ChronoDuration::hours(1),
        );
        let err = client(&server)
            .upload_media(&UsableUri::Signed(access))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_get_file_maps_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/abc123",
                "uri": "https://example.com/files/abc123",
                "mimeType": "video/mp4",
                "state": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let handle = client(&server).get_file("files/abc123").await.unwrap();
        assert!(handle.is_active());
    }

    #[tokio::test]
    async fn test_get_file_without_state_is_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/abc123",
                "uri": "https://example.com/files/abc123"
            })))
            .mount(&server)
            .await;

        let handle = client(&server).get_file("files/abc123").await.unwrap();
        assert_eq!(handle.state, RemoteFileState::Pending);
        assert_eq!(handle.mime_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_generate_content_sends_media_then_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", DEFAULT_MODEL)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{"text": "{\"summary\":"}, {"text": "\"x\"}"}]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            parts: vec![
                RequestPart::Media {
                    file_uri: "https://example.com/files/abc123".to_string(),
                    mime_type: "video/mp4".to_string(),
                },
                RequestPart::Text("describe".to_string()),
            ],
            generation: GenerationParams::default(),
        };

        let text = client(&server).generate_content(&request).await.unwrap();
        assert_eq!(text, "{\"summary\":\"x\"}");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["fileData"]["fileUri"], "https://example.com/files/abc123");
        assert_eq!(parts[1]["text"], "describe");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_generate_content_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            parts: vec![RequestPart::Text("describe".to_string())],
            generation: GenerationParams::default(),
        };
        let err = client(&server).generate_content(&request).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_empty_candidates_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let request = AnalysisRequest {
            parts: vec![RequestPart::Text("describe".to_string())],
            generation: GenerationParams::default(),
        };
        let err = client(&server).generate_content(&request).await.unwrap_err();
        assert!(matches!(err, GeminiError::MalformedResponse { .. }));
    }

    #[test]
    fn test_expiry_message_detection() {
        assert!(is_expiry_message("<Code>ExpiredToken</Code>"));
        assert!(is_expiry_message("Request has expired"));
        assert!(!is_expiry_message("<Code>AccessDenied</Code>"));
    }
}
