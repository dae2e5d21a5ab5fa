//! # kview-sync
//!
//! Real-time cluster state synchronization for the kview dashboard.
//!
//! The crate keeps a local, read-optimised view of a Kubernetes cluster
//! (nodes, pods, namespaces, deployments and an aggregate metrics summary)
//! consistent with the backend. Point-in-time snapshots come over REST and
//! incremental change events arrive on a long-lived WebSocket session.
//!
//! ## Layout
//!
//! - [`session`]: connection state machine, reconnect policy and [`SyncClient`]
//! - [`subscriptions`]: what the client asked for, replayed on every session
//! - [`router`]: validates inbound events and dispatches them to the store
//! - [`store`] / [`view`]: the cluster view and its shared handle
//! - [`snapshot`]: REST listings loaded into the view
//!
//! ## Example
//!
//! ```rust,no_run
//! use kview_sync::{ClusterView, HttpSnapshotSource, SnapshotLoader, SyncClient, SyncConfig};
//!
//! # async fn run() -> kview_sync::SyncResult<()> {
//! let config = SyncConfig::default();
//! let view = ClusterView::new();
//!
//! let loader = SnapshotLoader::new(HttpSnapshotSource::new(&config)?, view.clone());
//! loader.refresh_all().await;
//!
//! let client = SyncClient::new(config, view.clone())?;
//! client.subscribe("pods", None);
//! client.start()?;
//!
//! let mut changes = view.changes();
//! while changes.changed().await.is_ok() {
//!     println!("{} pods", view.read().pods().len());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod view;

// Re-export main types
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use protocol::{ClientMessage, ClusterEvent, InboundEvent};
pub use router::{MessageRouter, RouteOutcome, RouterStats};
pub use session::{ConnectionState, ReconnectConfig, SyncClient, SyncEvent};
pub use snapshot::{HttpSnapshotSource, SnapshotLoader, SnapshotSource};
pub use store::{Change, ClusterViewStore, NamespaceFilter, SnapshotTarget};
pub use subscriptions::{Subscription, SubscriptionRegistry};
pub use types::{
    ClusterMetrics, ClusterObject, Deployment, HealthStatus, Namespace, Node, ObjectKey, Pod,
    ResourceKind,
};
pub use view::ClusterView;
