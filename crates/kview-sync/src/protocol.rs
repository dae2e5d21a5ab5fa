//! Wire protocol for the streaming backend.
//!
//! Inbound frames arrive as loosely-typed [`InboundEvent`]s and are validated
//! into the closed [`ClusterEvent`] set before anything touches the view.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    ClusterMetrics, ClusterObject, Deployment, Namespace, Node, ObjectKey, Pod, ResourceKind,
};

/// Type tag used by the backend for metrics pushes.
pub const METRICS_TYPE: &str = "metrics";

/// A message received from the streaming backend, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Declared payload type (`pods`, `metrics`, ...).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Action (`added`, `modified`, `deleted`, `initial`, ...).
    pub action: String,
    /// Namespace scope of the backend watch that produced the event.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Opaque payload.
    #[serde(default)]
    pub data: Value,
    /// Server timestamp.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Parse an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid event object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Namespace scope, with the empty string normalised to `None`.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

/// A message sent to the streaming backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Requested action (`subscribe_pods`, `get_metrics`, ...).
    pub action: String,
    /// Namespace argument; empty means all namespaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ClientMessage {
    /// Subscribe to a topic, optionally filtered to one namespace.
    #[must_use]
    pub fn subscribe(topic: &str, scope: Option<&str>) -> Self {
        Self {
            action: format!("subscribe_{topic}"),
            namespace: Some(scope.unwrap_or_default().to_string()),
        }
    }

    /// Ask the backend to push a fresh metrics summary.
    #[must_use]
    pub fn get_metrics() -> Self {
        Self {
            action: "get_metrics".to_string(),
            namespace: None,
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Normalised event action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Create or replace one object.
    Upsert,
    /// Remove one object.
    Delete,
    /// Full listing that replaces the kind.
    Initial,
    /// Anything else.
    Unrecognized(String),
}

impl EventAction {
    /// Parse a wire action, accepting both short and watch-style spellings.
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action {
            "add" | "added" | "update" | "modified" => Self::Upsert,
            "delete" | "deleted" => Self::Delete,
            "initial" => Self::Initial,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// A validated change for one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum KindEvent<T> {
    /// Upsert one object.
    Upsert(T),
    /// Delete by identity key.
    Delete(ObjectKey),
    /// Replace the whole kind.
    Initial(Vec<T>),
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    /// Node change.
    Nodes(KindEvent<Node>),
    /// Pod change.
    Pods(KindEvent<Pod>),
    /// Namespace change.
    Namespaces(KindEvent<Namespace>),
    /// Deployment change.
    Deployments(KindEvent<Deployment>),
    /// Metrics summary.
    Metrics(ClusterMetrics),
    /// Known type, unknown action.
    UnknownAction {
        /// Event type.
        event_type: String,
        /// Action as received.
        action: String,
    },
    /// Type this client does not understand.
    Unrecognized {
        /// Event type as received.
        event_type: String,
    },
}

impl ClusterEvent {
    /// Validate an inbound event.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the payload does not match
    /// its declared type.
    pub fn from_inbound(event: &InboundEvent) -> Result<Self, String> {
        let action = EventAction::parse(&event.action);

        if event.event_type == METRICS_TYPE {
            return match action {
                EventAction::Upsert | EventAction::Initial => {
                    let metrics = serde_json::from_value(event.data.clone())
                        .map_err(|e| format!("invalid metrics payload: {e}"))?;
                    Ok(Self::Metrics(metrics))
                }
                _ => Ok(Self::UnknownAction {
                    event_type: event.event_type.clone(),
                    action: event.action.clone(),
                }),
            };
        }

        let Ok(kind) = event.event_type.parse::<ResourceKind>() else {
            return Ok(Self::Unrecognized {
                event_type: event.event_type.clone(),
            });
        };

        if let EventAction::Unrecognized(action) = action {
            return Ok(Self::UnknownAction {
                event_type: event.event_type.clone(),
                action,
            });
        }

        let scope = event.scope();
        Ok(match kind {
            ResourceKind::Nodes => Self::Nodes(parse_kind(&action, &event.data, scope)?),
            ResourceKind::Pods => Self::Pods(parse_kind(&action, &event.data, scope)?),
            ResourceKind::Namespaces => {
                Self::Namespaces(parse_kind(&action, &event.data, scope)?)
            }
            ResourceKind::Deployments => {
                Self::Deployments(parse_kind(&action, &event.data, scope)?)
            }
        })
    }
}

fn parse_object<T>(data: &Value, scope: Option<&str>) -> Result<T, String>
where
    T: ClusterObject + DeserializeOwned,
{
    let mut object: T = serde_json::from_value(data.clone())
        .map_err(|e| format!("invalid {} payload: {e}", T::KIND))?;
    if let Some(ns) = scope {
        object.inherit_namespace(ns);
    }
    object.validate()?;
    Ok(object)
}

fn parse_kind<T>(action: &EventAction, data: &Value, scope: Option<&str>) -> Result<KindEvent<T>, String>
where
    T: ClusterObject + DeserializeOwned,
{
    match action {
        EventAction::Upsert => parse_object(data, scope).map(KindEvent::Upsert),
        EventAction::Delete => parse_object::<T>(data, scope).map(|o| KindEvent::Delete(o.key())),
        EventAction::Initial => {
            let items = match data {
                Value::Array(items) => items,
                Value::Null => return Ok(KindEvent::Initial(Vec::new())),
                _ => return Err(format!("{} initial payload is not a list", T::KIND)),
            };
            items
                .iter()
                .map(|item| parse_object(item, scope))
                .collect::<Result<Vec<T>, String>>()
                .map(KindEvent::Initial)
        }
        EventAction::Unrecognized(other) => Err(format!("unrecognized action: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, action: &str, namespace: Option<&str>, data: Value) -> InboundEvent {
        InboundEvent {
            event_type: event_type.to_string(),
            action: action.to_string(),
            namespace: namespace.map(str::to_string),
            data,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_inbound_event_from_json() {
        let json = r#"{
            "type": "pods",
            "action": "added",
            "namespace": "",
            "data": {"name": "web-0", "namespace": "default", "status": "Pending", "node": ""},
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;
        let event = InboundEvent::from_json(json).unwrap();
        assert_eq!(event.event_type, "pods");
        assert_eq!(event.action, "added");
        assert_eq!(event.scope(), None);
    }

    #[test]
    fn test_inbound_event_missing_timestamp_defaults() {
        let event = InboundEvent::from_json(r#"{"type":"pods","action":"added","data":{}}"#).unwrap();
        assert!(event.timestamp <= Utc::now());
    }

    #[test]
    fn test_inbound_event_malformed() {
        assert!(InboundEvent::from_json("not json").is_err());
        assert!(InboundEvent::from_json(r#"{"action":"added"}"#).is_err());
    }

    #[test]
    fn test_subscribe_message_shape() {
        let all = ClientMessage::subscribe("pods", None).to_json().unwrap();
        assert_eq!(all, r#"{"action":"subscribe_pods","namespace":""}"#);

        let scoped = ClientMessage::subscribe("pods", Some("kube-system"));
        assert_eq!(scoped.namespace.as_deref(), Some("kube-system"));
    }

    #[test]
    fn test_get_metrics_message_shape() {
        let json = ClientMessage::get_metrics().to_json().unwrap();
        assert_eq!(json, r#"{"action":"get_metrics"}"#);
    }

    #[test]
    fn test_action_spellings() {
        assert_eq!(EventAction::parse("add"), EventAction::Upsert);
        assert_eq!(EventAction::parse("modified"), EventAction::Upsert);
        assert_eq!(EventAction::parse("deleted"), EventAction::Delete);
        assert_eq!(EventAction::parse("initial"), EventAction::Initial);
        assert_eq!(
            EventAction::parse("bookmark"),
            EventAction::Unrecognized("bookmark".to_string())
        );
    }

    #[test]
    fn test_pod_upsert_validated() {
        let ev = event(
            "pods",
            "modified",
            None,
            json!({"name": "web-0", "namespace": "default", "status": "Running"}),
        );
        match ClusterEvent::from_inbound(&ev).unwrap() {
            ClusterEvent::Pods(KindEvent::Upsert(pod)) => assert_eq!(pod.status, "Running"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_pod_inherits_scope_namespace() {
        let ev = event("pods", "added", Some("staging"), json!({"name": "web-0"}));
        match ClusterEvent::from_inbound(&ev).unwrap() {
            ClusterEvent::Pods(KindEvent::Upsert(pod)) => assert_eq!(pod.namespace, "staging"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_pod_delete_yields_key() {
        let ev = event("pods", "deleted", None, json!({"name": "web-0", "namespace": "default"}));
        assert_eq!(
            ClusterEvent::from_inbound(&ev).unwrap(),
            ClusterEvent::Pods(KindEvent::Delete(ObjectKey::namespaced("default", "web-0")))
        );
    }

    #[test]
    fn test_pod_without_identity_rejected() {
        let ev = event("pods", "added", None, json!({"status": "Running"}));
        assert!(ClusterEvent::from_inbound(&ev).is_err());
    }

    #[test]
    fn test_initial_listing() {
        let ev = event(
            "pods",
            "initial",
            None,
            json!([
                {"name": "a", "namespace": "default", "status": "Running"},
                {"name": "b", "namespace": "default", "status": "Pending"}
            ]),
        );
        match ClusterEvent::from_inbound(&ev).unwrap() {
            ClusterEvent::Pods(KindEvent::Initial(pods)) => assert_eq!(pods.len(), 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_initial_listing_not_a_list() {
        let ev = event("pods", "initial", None, json!({"name": "a"}));
        assert!(ClusterEvent::from_inbound(&ev).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let ev = event("foo", "added", None, json!({}));
        assert_eq!(
            ClusterEvent::from_inbound(&ev).unwrap(),
            ClusterEvent::Unrecognized {
                event_type: "foo".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_action() {
        let ev = event("pods", "bookmark", None, json!({}));
        assert_eq!(
            ClusterEvent::from_inbound(&ev).unwrap(),
            ClusterEvent::UnknownAction {
                event_type: "pods".to_string(),
                action: "bookmark".to_string()
            }
        );
    }

    #[test]
    fn test_metrics_update() {
        let ev = event(
            "metrics",
            "update",
            None,
            json!({"total_nodes": 3, "total_pods": 12, "total_namespaces": 4}),
        );
        match ClusterEvent::from_inbound(&ev).unwrap() {
            ClusterEvent::Metrics(m) => assert_eq!(m.total_pods, 12),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
