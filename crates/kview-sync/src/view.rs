//! Shared handle to the cluster view.
//!
//! Built once at the composition root and passed by clone to the session
//! driver, snapshot loaders and UI consumers.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::sync::watch;

use crate::store::{ClusterViewStore, NamespaceFilter};

/// Cloneable handle to one [`ClusterViewStore`].
///
/// Consumers get read guards and a revision channel. Writes are reserved to
/// the router and snapshot loaders in this crate.
#[derive(Debug, Clone)]
pub struct ClusterView {
    store: Arc<RwLock<ClusterViewStore>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Default for ClusterView {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store: Arc::new(RwLock::new(ClusterViewStore::new())),
            changes: Arc::new(changes),
        }
    }

    /// Borrow the store for reading.
    ///
    /// Hold the guard briefly; writers wait on it.
    pub fn read(&self) -> RwLockReadGuard<'_, ClusterViewStore> {
        self.store.read()
    }

    /// Receive the store revision after each write.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Current store revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.store.read().revision()
    }

    /// Change the namespace selection used by `selected_pods`.
    pub fn select_namespace(&self, filter: NamespaceFilter) {
        self.write(|store| store.set_selected_namespace(filter));
    }

    /// Run one write under the lock, then notify watchers.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut ClusterViewStore) -> R) -> R {
        let (result, revision) = {
            let mut store = self.store.write();
            let result = f(&mut store);
            (result, store.revision())
        };
        self.changes.send_if_modified(|current| {
            if *current == revision {
                false
            } else {
                *current = revision;
                true
            }
        });
        result
    }
}
