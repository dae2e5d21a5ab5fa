//! Subscription registry.
//!
//! The registry, not the connection, is the authoritative record of what the
//! client wants. Every new session replays it in registration order.

use crate::protocol::ClientMessage;

/// A logical topic the client wants updates for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Topic name (`pods`, `nodes`, ...).
    pub topic: String,
    /// Namespace filter; `None` means all namespaces.
    pub scope: Option<String>,
}

impl Subscription {
    /// Create a subscription. An empty scope means all namespaces.
    pub fn new(topic: impl Into<String>, scope: Option<&str>) -> Self {
        Self {
            topic: topic.into(),
            scope: scope.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Outbound message that requests this subscription.
    #[must_use]
    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::subscribe(&self.topic, self.scope.as_deref())
    }

    /// Whether an event for `topic` tagged with `scope` falls under this subscription.
    #[must_use]
    pub fn covers(&self, topic: &str, scope: Option<&str>) -> bool {
        if self.topic != topic {
            return false;
        }
        match &self.scope {
            None => true,
            Some(own) => scope == Some(own.as_str()),
        }
    }
}

/// Ordered, de-duplicated set of subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Returns `true` if it was not already present.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        if self.entries.contains(&subscription) {
            return false;
        }
        self.entries.push(subscription);
        true
    }

    /// Remove a subscription. Returns `true` if it was present.
    ///
    /// Nothing is sent upstream; the backend may keep pushing until it times
    /// the subscription out, and the router discards those events.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s != subscription);
        self.entries.len() != before
    }

    /// Messages to send on a fresh session, in registration order.
    #[must_use]
    pub fn replay(&self) -> Vec<ClientMessage> {
        self.entries.iter().map(Subscription::to_message).collect()
    }

    /// Whether any subscription still wants events for this topic and scope.
    #[must_use]
    pub fn covers(&self, topic: &str, scope: Option<&str>) -> bool {
        self.entries.iter().any(|s| s.covers(topic, scope))
    }

    /// Namespaces named by the scoped subscriptions for `topic`, in order.
    #[must_use]
    pub fn scoped_namespaces(&self, topic: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|s| s.topic == topic)
            .filter_map(|s| s.scope.as_deref())
            .collect()
    }

    /// Registered subscriptions, in order.
    #[must_use]
    pub fn entries(&self) -> &[Subscription] {
        &self.entries
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
