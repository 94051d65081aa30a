//! Provider-side file handles.

use serde::{Deserialize, Serialize};

/// Processing state of an uploaded media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFileState {
    /// Submitted but not yet acknowledged by the provider
    #[default]
    Pending,
    /// Provider is preparing the file
    Processing,
    /// Ready to be referenced in a generation request
    Active,
    /// Provider gave up on the file
    Failed,
}

impl RemoteFileState {
    /// Map the provider's state name (`PROCESSING`, `ACTIVE`, ...).
    ///
    /// Unknown names map to `Pending` so polling continues until a
    /// recognizable terminal state or the deadline.
    pub fn from_provider(state: &str) -> Self {
        match state.trim().to_ascii_uppercase().as_str() {
            "PROCESSING" => Self::Processing,
            "ACTIVE" => Self::Active,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Active` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Failed)
    }
}

impl std::fmt::Display for RemoteFileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media file registered with the inference provider.
///
/// Owned by one analysis call; each poll replaces it with the provider's
/// latest view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileHandle {
    /// Provider resource name (e.g. `files/abc123`)
    pub id: String,
    /// URI used to reference the file in generation requests
    pub uri: String,
    /// Detected content type
    pub mime_type: String,
    pub state: RemoteFileState,
}

impl RemoteFileHandle {
    pub fn is_active(&self) -> bool {
        self.state == RemoteFileState::Active
    }
}
