//! Error types for the sync client.

use thiserror::Error;

use crate::types::ResourceKind;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the sync client.
///
/// Transport and inbound-data failures never surface as `SyncError` to view
/// consumers; they are converted into connection state and per-kind error
/// fields. This type covers configuration, setup and snapshot fetches.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Streaming connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A snapshot request for one kind failed.
    #[error("{kind} snapshot failed: {message}")]
    Snapshot {
        /// Kind being loaded (`metrics` and `health` included).
        kind: String,
        /// Human-readable reason.
        message: String,
    },

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session driver is no longer running.
    #[error("sync client channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Build a snapshot error for a resource kind.
    pub fn snapshot(kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::Snapshot {
            kind: kind.as_str().to_string(),
            message: message.into(),
        }
    }
}
