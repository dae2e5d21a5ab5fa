//! Connection state types.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// State of the live-event session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No session and no pending attempt.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Session is live.
    Connected,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// Retry ceiling reached; waits for an explicit open.
    Failed,
}

impl ConnectionState {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    const fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session state shared by every client handle and the driver task.
///
/// Only the driver writes it; handles read it to gate sends.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    /// Cell starting in `state`.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// State most recently published by the driver.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_repr(self.0.load(Ordering::Acquire))
    }

    /// Publish a transition.
    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
