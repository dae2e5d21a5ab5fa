//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::session::ReconnectConfig;

/// Default live-event endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/api/ws";

/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Configuration for [`SyncClient`](crate::SyncClient) and
/// [`HttpSnapshotSource`](crate::HttpSnapshotSource).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket URL of the event stream.
    pub ws_url: String,
    /// Base URL of the REST API.
    pub api_url: String,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
    /// Timeout for each REST request.
    pub request_timeout: Duration,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            request_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Create a configuration with the given endpoints.
    #[must_use]
    pub fn new(ws_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Set the WebSocket URL.
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the REST base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the REST request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the lifecycle event channel capacity.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check URLs and limits.
    pub fn validate(&self) -> SyncResult<()> {
        let ws = Url::parse(&self.ws_url)
            .map_err(|e| SyncError::Config(format!("invalid ws_url {}: {e}", self.ws_url)))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(SyncError::Config(format!(
                "ws_url must use ws:// or wss://, got {}",
                self.ws_url
            )));
        }

        let api = Url::parse(&self.api_url)
            .map_err(|e| SyncError::Config(format!("invalid api_url {}: {e}", self.api_url)))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "api_url must use http:// or https://, got {}",
                self.api_url
            )));
        }

        if self.event_capacity == 0 {
            return Err(SyncError::Config("event_capacity must be positive".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config("request_timeout must be positive".to_string()));
        }
        Ok(())
    }
}
