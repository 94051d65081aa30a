//! Remote file registration and processing wait.
//!
//! State machine: `Pending -> Processing -> {Active | Failed}`. The handle
//! returned by each poll replaces the previous one; nothing else is cached.
//! Waiting is bounded by [`PollConfig::max_wait`] and can be cancelled.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vtag_models::{RemoteFileHandle, RemoteFileState, UsableUri};

use crate::error::{GeminiError, GeminiResult};
use crate::provider::InferenceProvider;

/// Total file-state polls issued.
pub const FILE_POLLS_TOTAL: &str = "vtag_file_polls_total";

/// Polling behavior for [`RemoteFileProcessor::wait_until_active`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between state checks
    pub interval: Duration,
    /// Give up once another poll would exceed this much total waiting
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// Drives uploaded media to a terminal state.
#[derive(Clone)]
pub struct RemoteFileProcessor {
    provider: Arc<dyn InferenceProvider>,
    poll: PollConfig,
}

impl RemoteFileProcessor {
    pub fn new(provider: Arc<dyn InferenceProvider>, poll: PollConfig) -> Self {
        Self { provider, poll }
    }

    /// Submit media to the provider.
    pub async fn register(&self, media: &UsableUri) -> GeminiResult<RemoteFileHandle> {
        info!(media = %media.display_name(), "Uploading media");
        let handle = self.provider.upload_media(media).await?;
        info!(file_id = %handle.id, state = %handle.state, "Media uploaded");
        Ok(handle)
    }

    /// Poll until the file is `Active`.
    ///
    /// Fails with `Processing` on `Failed`, `ProcessingTimeout` when the next
    /// poll would overrun `max_wait`, and `Cancelled` when `cancel` flips to
    /// `true`.
    pub async fn wait_until_active(
        &self,
        handle: RemoteFileHandle,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> GeminiResult<RemoteFileHandle> {
        let started = Instant::now();
        let mut handle = handle;

        loop {
            match handle.state {
                RemoteFileState::Active => {
                    info!(
                        file_id = %handle.id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Remote file active"
                    );
                    return Ok(handle);
                }
                RemoteFileState::Failed => {
                    warn!(file_id = %handle.id, "Remote file processing failed");
                    return Err(GeminiError::Processing {
                        last_state: handle.state,
                    });
                }
                RemoteFileState::Pending | RemoteFileState::Processing => {}
            }

            let waited = started.elapsed();
            if waited + self.poll.interval > self.poll.max_wait {
                warn!(
                    file_id = %handle.id,
                    waited_ms = waited.as_millis() as u64,
                    "Gave up waiting for remote file"
                );
                return Err(GeminiError::ProcessingTimeout {
                    waited,
                    last_state: handle.state,
                });
            }

            self.pause(cancel.as_mut()).await?;

            handle = self.provider.get_file(&handle.id).await?;
            counter!(FILE_POLLS_TOTAL).increment(1);
            debug!(file_id = %handle.id, state = %handle.state, "Polled remote file");
        }
    }

    /// Sleep one interval, returning early with `Cancelled` if signalled.
    async fn pause(&self, cancel: Option<&mut watch::Receiver<bool>>) -> GeminiResult<()> {
        let deadline = Instant::now() + self.poll.interval;

        let Some(rx) = cancel else {
            tokio::time::sleep_until(deadline).await;
            return Ok(());
        };

        loop {
            if *rx.borrow_and_update() {
                return Err(GeminiError::Cancelled);
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender gone; cancellation can no longer arrive.
                        tokio::time::sleep_until(deadline).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
