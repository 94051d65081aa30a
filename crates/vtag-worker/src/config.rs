//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vtag_gemini::{GeminiConfig, GenerationParams, PollConfig};
use vtag_models::CategorySet;
use vtag_storage::{LogMode, S3Config, DEFAULT_PRESIGN_TTL};

use crate::error::{WorkerError, WorkerResult};

pub const DEFAULT_OUTPUT_PATH: &str = "./video_analysis_result.json";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Inference provider settings
    pub gemini: GeminiConfig,
    /// Object store settings
    pub s3: S3Config,
    /// Remote file polling interval and deadline
    pub poll: PollConfig,
    /// Presigned URL validity window
    pub presign_ttl: Duration,
    /// HEAD remote objects before signing
    pub verify_remote_objects: bool,
    /// Result log location
    pub output_path: PathBuf,
    /// Result log format
    pub log_mode: LogMode,
    /// Permitted categories
    pub categories: CategorySet,
    /// Custom prompt template file
    pub prompt_template: Option<PathBuf>,
    /// Sampling parameters
    pub generation: GenerationParams,
}

impl WorkerConfig {
    /// Defaults for everything except the API key.
    pub fn new(gemini: GeminiConfig) -> Self {
        Self {
            gemini,
            s3: S3Config::default(),
            poll: PollConfig::default(),
            presign_ttl: DEFAULT_PRESIGN_TTL,
            verify_remote_objects: true,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            log_mode: LogMode::default(),
            categories: CategorySet::default(),
            prompt_template: None,
            generation: GenerationParams::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// Unparseable numbers fall back to defaults; a missing API key, an
    /// empty category list or a zero poll interval is an error.
    pub fn from_env() -> WorkerResult<Self> {
        let gemini = GeminiConfig::from_env()?;
        let defaults = Self::new(gemini);
        let generation = GenerationParams::default();

        let categories = match std::env::var("VTAG_CATEGORIES") {
            Ok(list) if !list.trim().is_empty() => CategorySet::parse_list(&list)
                .map_err(|e| WorkerError::config_error(format!("VTAG_CATEGORIES: {}", e)))?,
            _ => defaults.categories,
        };

        Ok(Self {
            s3: S3Config::from_env(),
            poll: poll_from_secs(
                env_or("VTAG_POLL_INTERVAL_SECS", 2),
                env_or("VTAG_MAX_PROCESSING_WAIT_SECS", 600),
            )?,
            presign_ttl: Duration::from_secs(env_or(
                "VTAG_PRESIGN_TTL_SECS",
                DEFAULT_PRESIGN_TTL.as_secs(),
            )),
            verify_remote_objects: env_or("VTAG_VERIFY_REMOTE_OBJECTS", true),
            output_path: std::env::var("VTAG_OUTPUT_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            log_mode: env_or("VTAG_LOG_MODE", LogMode::default()),
            categories,
            prompt_template: std::env::var("VTAG_PROMPT_TEMPLATE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            generation: GenerationParams {
                temperature: env_or("VTAG_TEMPERATURE", generation.temperature),
                top_p: env_or("VTAG_TOP_P", generation.top_p),
                top_k: env_or("VTAG_TOP_K", generation.top_k),
                max_output_tokens: env_or("VTAG_MAX_OUTPUT_TOKENS", generation.max_output_tokens),
                ..generation
            },
            gemini: defaults.gemini,
        })
    }
}

/// The poll interval must be at least one second.
fn poll_from_secs(interval: u64, max_wait: u64) -> WorkerResult<PollConfig> {
    if interval == 0 {
        return Err(WorkerError::config_error(
            "VTAG_POLL_INTERVAL_SECS must be at least 1",
        ));
    }
    Ok(PollConfig {
        interval: Duration::from_secs(interval),
        max_wait: Duration::from_secs(max_wait),
    })
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
