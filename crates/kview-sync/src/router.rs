//! Message router.
//!
//! Classifies inbound frames and dispatches them to the matching store
//! merge. Holds no state other than counters.

use tracing::{debug, trace, warn};

use crate::protocol::{ClusterEvent, InboundEvent, KindEvent};
use crate::store::{Change, ClusterViewStore, StoredKind};
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{ObjectKey, ResourceKind};

/// Counters kept for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Events that reached the store.
    pub routed: u64,
    /// Frames that were not a valid event object.
    pub malformed: u64,
    /// Events with a type this client does not know.
    pub unknown_type: u64,
    /// Events with a known type but unknown action.
    pub unknown_action: u64,
    /// Events whose payload failed validation.
    pub invalid_payload: u64,
    /// Events for topics no longer subscribed.
    pub unsubscribed: u64,
}

/// What happened to one routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The store changed.
    Applied,
    /// Valid event with no effect (for example deleting an absent key).
    Unchanged,
    /// Frame was not a valid event.
    Malformed,
    /// Type not understood.
    UnknownType,
    /// Action not understood.
    UnknownAction,
    /// Payload failed validation.
    InvalidPayload,
    /// Topic not subscribed any more.
    Unsubscribed,
}

/// Dispatches validated events into the store.
#[derive(Debug, Default)]
pub struct MessageRouter {
    stats: RouterStats,
}

impl MessageRouter {
    /// Create a router with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Record a frame that could not be parsed at all.
    pub fn record_malformed(&mut self, error: &serde_json::Error) -> RouteOutcome {
        self.stats.malformed += 1;
        warn!(error = %error, "Dropping malformed frame");
        RouteOutcome::Malformed
    }

    /// Parse a text frame and route it.
    pub fn route_frame(
        &mut self,
        frame: &str,
        subscriptions: &SubscriptionRegistry,
        store: &mut ClusterViewStore,
    ) -> RouteOutcome {
        match InboundEvent::from_json(frame) {
            Ok(event) => self.route(&event, subscriptions, store),
            Err(e) => self.record_malformed(&e),
        }
    }

    /// Route one inbound event.
    ///
    /// A kind event tagged with a namespace is gated on that tag before its
    /// payload is read. The backend also pushes untagged events from a
    /// cluster-wide watch; those are gated on each object's own namespace.
    pub fn route(
        &mut self,
        event: &InboundEvent,
        subscriptions: &SubscriptionRegistry,
        store: &mut ClusterViewStore,
    ) -> RouteOutcome {
        let scope = event.scope();
        let is_kind = event.event_type.parse::<ResourceKind>().is_ok();
        if is_kind && scope.is_some_and(|tag| !subscriptions.covers(&event.event_type, Some(tag))) {
            return self.discard_unsubscribed(event);
        }

        let cluster_event = match ClusterEvent::from_inbound(event) {
            Ok(ev) => ev,
            Err(reason) => {
                self.stats.invalid_payload += 1;
                warn!(
                    event_type = %event.event_type,
                    action = %event.action,
                    reason = %reason,
                    "Dropping event with invalid payload"
                );
                return RouteOutcome::InvalidPayload;
            }
        };

        let merged = match cluster_event {
            ClusterEvent::Nodes(ev) => merge(store, ev, scope, subscriptions),
            ClusterEvent::Pods(ev) => merge(store, ev, scope, subscriptions),
            ClusterEvent::Namespaces(ev) => merge(store, ev, scope, subscriptions),
            ClusterEvent::Deployments(ev) => merge(store, ev, scope, subscriptions),
            ClusterEvent::Metrics(metrics) => {
                store.set_metrics(metrics);
                Some(true)
            }
            ClusterEvent::UnknownAction { event_type, action } => {
                self.stats.unknown_action += 1;
                warn!(event_type = %event_type, action = %action, "Ignoring unrecognized action");
                return RouteOutcome::UnknownAction;
            }
            ClusterEvent::Unrecognized { event_type } => {
                self.stats.unknown_type += 1;
                debug!(event_type = %event_type, "Discarding event of unknown type");
                return RouteOutcome::UnknownType;
            }
        };

        let Some(changed) = merged else {
            return self.discard_unsubscribed(event);
        };

        self.stats.routed += 1;
        trace!(event_type = %event.event_type, action = %event.action, changed, "Routed event");
        if changed {
            RouteOutcome::Applied
        } else {
            RouteOutcome::Unchanged
        }
    }

    fn discard_unsubscribed(&mut self, event: &InboundEvent) -> RouteOutcome {
        self.stats.unsubscribed += 1;
        debug!(
            event_type = %event.event_type,
            scope = ?event.scope(),
            "Discarding event for unsubscribed topic"
        );
        RouteOutcome::Unsubscribed
    }
}

/// Apply a kind event. Returns `None` when no subscription covers it.
///
/// `scope` is the event's namespace tag, already checked against the
/// registry by the caller.
fn merge<T: StoredKind>(
    store: &mut ClusterViewStore,
    event: KindEvent<T>,
    scope: Option<&str>,
    subscriptions: &SubscriptionRegistry,
) -> Option<bool> {
    let topic = T::KIND.as_str();
    let covered =
        |key: &ObjectKey| scope.is_some() || subscriptions.covers(topic, key.namespace.as_deref());

    match event {
        KindEvent::Upsert(item) => {
            covered(&item.key()).then(|| store.apply_event(Change::Upsert(item)))
        }
        KindEvent::Delete(key) => {
            covered(&key).then(|| store.apply_event::<T>(Change::Delete(key)))
        }
        KindEvent::Initial(items) => {
            if let Some(namespace) = scope.filter(|_| T::KIND.is_namespaced()) {
                store.replace_namespace(namespace, items);
                return Some(true);
            }
            if scope.is_some() || subscriptions.covers(topic, None) {
                store.replace_snapshot(items);
                return Some(true);
            }

            // Cluster-wide listing, but only scoped subscriptions for it.
            let namespaces = subscriptions.scoped_namespaces(topic);
            if namespaces.is_empty() || !T::KIND.is_namespaced() {
                return None;
            }
            for namespace in namespaces {
                store.replace_namespace(namespace, items.clone());
            }
            Some(true)
        }
    }
}
