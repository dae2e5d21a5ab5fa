//! Session lifecycle events.

use std::time::Duration;

use super::state::ConnectionState;

/// Events published by [`SyncClient`](super::SyncClient) on its broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The connection state moved.
    StateChanged(ConnectionState),
    /// A session became live and subscriptions were replayed.
    Connected {
        /// Number of subscribe messages sent.
        replayed: usize,
    },
    /// The live session ended without a local close.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
    /// A retry is scheduled.
    Reconnecting {
        /// Attempt number of the upcoming open.
        attempt: u32,
        /// Delay before it starts.
        delay: Duration,
    },
    /// The retry ceiling was reached.
    ReconnectFailed {
        /// Consecutive failed opens.
        attempts: u32,
        /// Error from the last open.
        last_error: String,
    },
    /// Closed locally; no reconnect will follow.
    Closed,
}
