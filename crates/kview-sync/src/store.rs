//! Cluster view store and its derived projections.
//!
//! Mutation goes through [`ClusterViewStore::replace_snapshot`] for bulk
//! loads, [`ClusterViewStore::replace_namespace`] for listings scoped to one
//! namespace and [`ClusterViewStore::apply_event`] for incremental merges. Projections are recomputed inside the same call, so a reader never
//! observes a write half-applied.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::{
    ClusterMetrics, ClusterObject, Deployment, Namespace, Node, ObjectKey, Pod, ResourceKind,
};

/// An incremental change to one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// Insert or replace by identity key.
    Upsert(T),
    /// Remove by identity key.
    Delete(ObjectKey),
}

/// Latest known objects of one kind, keyed by identity.
#[derive(Debug, Clone)]
pub struct KindTable<T> {
    items: BTreeMap<ObjectKey, T>,
}

impl<T> Default for KindTable<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: ClusterObject> KindTable<T> {
    fn replace(&mut self, items: Vec<T>) {
        self.items = items.into_iter().map(|item| (item.key(), item)).collect();
    }

    fn replace_namespace(&mut self, namespace: &str, items: Vec<T>) {
        self.items
            .retain(|key, _| key.namespace.as_deref() != Some(namespace));
        self.items.extend(
            items
                .into_iter()
                .map(|item| (item.key(), item))
                .filter(|(key, _)| key.namespace.as_deref() == Some(namespace)),
        );
    }

    fn upsert(&mut self, item: T) {
        self.items.insert(item.key(), item);
    }

    fn remove(&mut self, key: &ObjectKey) -> bool {
        self.items.remove(key).is_some()
    }

    /// Look up an object by key.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<&T> {
        self.items.get(key)
    }

    /// Whether an object with this key is present.
    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.items.contains_key(key)
    }

    /// Iterate objects in key order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Iterate keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.items.keys()
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Kinds the store keeps a table for.
pub trait StoredKind: ClusterObject {
    /// The table holding this kind.
    fn table(store: &ClusterViewStore) -> &KindTable<Self>;

    /// Mutable access to the table holding this kind.
    fn table_mut(store: &mut ClusterViewStore) -> &mut KindTable<Self>;
}

macro_rules! stored_kind {
    ($ty:ty, $field:ident) => {
        impl StoredKind for $ty {
            fn table(store: &ClusterViewStore) -> &KindTable<Self> {
                &store.$field
            }

            fn table_mut(store: &mut ClusterViewStore) -> &mut KindTable<Self> {
                &mut store.$field
            }
        }
    };
}

stored_kind!(Node, nodes);
stored_kind!(Pod, pods);
stored_kind!(Namespace, namespaces);
stored_kind!(Deployment, deployments);

/// Something loaded from the snapshot collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapshotTarget {
    /// One resource kind.
    Kind(ResourceKind),
    /// The metrics summary.
    Metrics,
}

impl fmt::Display for SnapshotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind(kind) => fmt::Display::fmt(kind, f),
            Self::Metrics => f.write_str("metrics"),
        }
    }
}

impl From<ResourceKind> for SnapshotTarget {
    fn from(kind: ResourceKind) -> Self {
        Self::Kind(kind)
    }
}

/// Load bookkeeping for one snapshot target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStatus {
    /// A request is in flight.
    pub loading: bool,
    /// Error from the latest failed refresh; cleared by the next success.
    pub error: Option<String>,
    /// When the latest successful load landed.
    pub last_loaded: Option<DateTime<Utc>>,
}

/// Namespace filter for pod projections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceFilter {
    /// Every namespace.
    #[default]
    All,
    /// A single namespace.
    Only(String),
}

impl NamespaceFilter {
    /// Parse a filter; `"all"` and the empty string select every namespace.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "" | "all" => Self::All,
            ns => Self::Only(ns.to_string()),
        }
    }

    /// Whether a namespace passes the filter.
    #[must_use]
    pub fn matches(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ns) => ns == namespace,
        }
    }

    /// The namespace, or `None` for all.
    #[must_use]
    pub fn as_namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Only(ns) => Some(ns),
        }
    }

    /// Query-parameter form understood by the REST backend.
    #[must_use]
    pub fn as_query(&self) -> &str {
        self.as_namespace().unwrap_or("all")
    }
}

impl From<&str> for NamespaceFilter {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// In-memory view of cluster state.
#[derive(Debug, Default)]
pub struct ClusterViewStore {
    nodes: KindTable<Node>,
    pods: KindTable<Pod>,
    namespaces: KindTable<Namespace>,
    deployments: KindTable<Deployment>,
    metrics: Option<ClusterMetrics>,
    load_status: BTreeMap<SnapshotTarget, LoadStatus>,
    selected_namespace: NamespaceFilter,
    pods_by_status: BTreeMap<String, usize>,
    revision: u64,
}

impl ClusterViewStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Writes ====================

    /// Replace every object of a kind with a fresh listing.
    ///
    /// Entries missing from `items` are removed. This wins over any
    /// incremental event that arrived earlier, whatever its timestamp.
    pub fn replace_snapshot<T: StoredKind>(&mut self, items: Vec<T>) {
        T::table_mut(self).replace(items);
        let status = self.status_mut(T::KIND.into());
        status.loading = false;
        status.error = None;
        status.last_loaded = Some(Utc::now());
        self.after_write(T::KIND);
    }

    /// Replace the objects of one namespace with a listing scoped to it.
    ///
    /// Other namespaces are left alone, as are items in `items` that belong
    /// to a different namespace (they are dropped). Load status is untouched:
    /// this is not a full snapshot of the kind.
    pub fn replace_namespace<T: StoredKind>(&mut self, namespace: &str, items: Vec<T>) {
        T::table_mut(self).replace_namespace(namespace, items);
        self.after_write(T::KIND);
    }

    /// Apply one incremental change. Returns `false` when it was a no-op
    /// (deleting an absent key).
    pub fn apply_event<T: StoredKind>(&mut self, change: Change<T>) -> bool {
        let changed = match change {
            Change::Upsert(item) => {
                T::table_mut(self).upsert(item);
                true
            }
            Change::Delete(key) => T::table_mut(self).remove(&key),
        };
        if changed {
            self.after_write(T::KIND);
        }
        changed
    }

    /// Replace the metrics summary.
    pub fn set_metrics(&mut self, metrics: ClusterMetrics) {
        self.metrics = Some(metrics);
        let status = self.status_mut(SnapshotTarget::Metrics);
        status.loading = false;
        status.error = None;
        status.last_loaded = Some(Utc::now());
        self.revision += 1;
    }

    /// Flag a snapshot request as in flight.
    pub fn mark_loading(&mut self, target: SnapshotTarget) {
        self.status_mut(target).loading = true;
        self.revision += 1;
    }

    /// Record a failed refresh. Last-known data is kept.
    pub fn record_error(&mut self, target: SnapshotTarget, message: impl Into<String>) {
        let status = self.status_mut(target);
        status.loading = false;
        status.error = Some(message.into());
        self.revision += 1;
    }

    /// Change the namespace selection used by [`Self::selected_pods`].
    pub fn set_selected_namespace(&mut self, filter: NamespaceFilter) {
        if self.selected_namespace != filter {
            self.selected_namespace = filter;
            self.revision += 1;
        }
    }

    fn status_mut(&mut self, target: SnapshotTarget) -> &mut LoadStatus {
        self.load_status.entry(target).or_default()
    }

    fn after_write(&mut self, kind: ResourceKind) {
        if kind == ResourceKind::Pods {
            self.pods_by_status = count_by_status(&self.pods);
        }
        self.revision += 1;
    }

    // ==================== Reads ====================

    /// Table for any stored kind.
    #[must_use]
    pub fn table<T: StoredKind>(&self) -> &KindTable<T> {
        T::table(self)
    }

    /// Nodes.
    #[must_use]
    pub fn nodes(&self) -> &KindTable<Node> {
        &self.nodes
    }

    /// Pods.
    #[must_use]
    pub fn pods(&self) -> &KindTable<Pod> {
        &self.pods
    }

    /// Namespaces.
    #[must_use]
    pub fn namespaces(&self) -> &KindTable<Namespace> {
        &self.namespaces
    }

    /// Deployments.
    #[must_use]
    pub fn deployments(&self) -> &KindTable<Deployment> {
        &self.deployments
    }

    /// Latest metrics summary, if any has landed.
    #[must_use]
    pub fn metrics(&self) -> Option<&ClusterMetrics> {
        self.metrics.as_ref()
    }

    /// Load bookkeeping for a target.
    #[must_use]
    pub fn load_status(&self, target: SnapshotTarget) -> LoadStatus {
        self.load_status.get(&target).cloned().unwrap_or_default()
    }

    /// Error from the latest failed refresh of a target.
    #[must_use]
    pub fn error(&self, target: SnapshotTarget) -> Option<&str> {
        self.load_status
            .get(&target)
            .and_then(|s| s.error.as_deref())
    }

    /// Pod counts keyed by lowercased status.
    #[must_use]
    pub fn pods_by_status(&self) -> &BTreeMap<String, usize> {
        &self.pods_by_status
    }

    /// Pods passing a namespace filter.
    #[must_use]
    pub fn filtered_pods(&self, filter: &NamespaceFilter) -> Vec<&Pod> {
        self.pods
            .iter()
            .filter(|pod| filter.matches(&pod.namespace))
            .collect()
    }

    /// Current namespace selection.
    #[must_use]
    pub fn selected_namespace(&self) -> &NamespaceFilter {
        &self.selected_namespace
    }

    /// Pods in the selected namespace.
    #[must_use]
    pub fn selected_pods(&self) -> Vec<&Pod> {
        self.filtered_pods(&self.selected_namespace)
    }

    /// Counter bumped by every observable write.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }
}

fn count_by_status(pods: &KindTable<Pod>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for pod in pods.iter() {
        *counts.entry(pod.status().to_lowercase()).or_insert(0) += 1;
    }
    counts
}
