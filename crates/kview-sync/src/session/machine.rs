//! Session state machine.
//!
//! Pure transitions with no I/O. The driver in [`client`](super::client)
//! performs the side effects each transition asks for.
//!
//! ```text
//! Disconnected --open--> Connecting --success--> Connected
//! Connecting --failure--> Reconnecting | Failed
//! Connected --remote close/error--> Reconnecting
//! Reconnecting --timer--> Connecting
//! Connected|Connecting|Reconnecting --local close--> Disconnected
//! Failed|Disconnected --open--> Connecting
//! ```

use std::time::Duration;

use super::reconnect::ReconnectConfig;
use super::state::ConnectionState;

/// What the driver should do after a session is lost or an open fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Wait `delay`, then open again.
    Retry {
        /// Attempt number of the upcoming open.
        attempt: u32,
        /// Delay before it.
        delay: Duration,
    },
    /// Ceiling reached; stay failed.
    GiveUp {
        /// Consecutive failed opens.
        attempts: u32,
    },
}

/// Connection state plus the consecutive-failure counter.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: ConnectionState,
    failures: u32,
    policy: ReconnectConfig,
}

impl SessionMachine {
    /// Create a machine in `Disconnected`.
    #[must_use]
    pub const fn new(policy: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            failures: 0,
            policy,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed opens since the last live session.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Start an attempt. Returns `false` if one is already live or in flight.
    ///
    /// Opening from `Disconnected` or `Failed` starts a new retry series.
    pub fn begin_open(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => false,
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.failures = 0;
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Reconnecting => {
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// The attempt succeeded.
    pub fn on_connected(&mut self) {
        self.failures = 0;
        self.state = ConnectionState::Connected;
    }

    /// The attempt failed.
    pub fn on_open_failed(&mut self) -> Next {
        self.failures = self.failures.saturating_add(1);
        if self.policy.should_reconnect(self.failures) {
            self.state = ConnectionState::Reconnecting;
            let attempt = self.failures + 1;
            Next::Retry {
                attempt,
                delay: self.policy.delay_for_attempt(attempt),
            }
        } else {
            self.state = ConnectionState::Failed;
            Next::GiveUp {
                attempts: self.failures,
            }
        }
    }

    /// A live session ended without a local close.
    pub fn on_connection_lost(&mut self) -> Next {
        if self.policy.should_reconnect(self.failures) {
            self.state = ConnectionState::Reconnecting;
            let attempt = self.failures + 1;
            Next::Retry {
                attempt,
                delay: self.policy.delay_for_attempt(attempt),
            }
        } else {
            self.state = ConnectionState::Failed;
            Next::GiveUp {
                attempts: self.failures,
            }
        }
    }

    /// The client asked to close. Returns `true` if the state changed.
    pub fn on_local_close(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => false,
            _ => {
                self.state = ConnectionState::Disconnected;
                true
            }
        }
    }
}
