//! Live-event session: connection lifecycle, reconnection and the client handle.

mod client;
mod events;
mod machine;
mod reconnect;
mod state;

pub use client::SyncClient;
pub use events::SyncEvent;
pub use machine::{Next, SessionMachine};
pub use reconnect::ReconnectConfig;
pub use state::{AtomicConnectionState, ConnectionState};
