//! Cluster object types as served by the kview backend.
//!
//! Field names follow the backend's JSON. Only identity fields are required;
//! push events carry a reduced pod shape, so everything else defaults.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The kinds of cluster object kept in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Cluster nodes.
    Nodes,
    /// Pods.
    Pods,
    /// Namespaces.
    Namespaces,
    /// Deployments.
    Deployments,
}

impl ResourceKind {
    /// All kinds, in refresh order.
    pub const ALL: [Self; 4] = [Self::Nodes, Self::Pods, Self::Namespaces, Self::Deployments];

    /// Wire name of the kind (the inbound `type` / subscription topic).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Pods => "pods",
            Self::Namespaces => "namespaces",
            Self::Deployments => "deployments",
        }
    }

    /// Whether objects of this kind live inside a namespace.
    #[must_use]
    pub const fn is_namespaced(self) -> bool {
        matches!(self, Self::Pods | Self::Deployments)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nodes" => Ok(Self::Nodes),
            "pods" => Ok(Self::Pods),
            "namespaces" => Ok(Self::Namespaces),
            "deployments" => Ok(Self::Deployments),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Read an explicit `null` as the field's default.
///
/// The backend writes nil maps and unset optional fields as `null` rather
/// than leaving them out.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Stable identity of a cluster object within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace, for namespaced kinds.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Key for a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key for a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Common behaviour of every object kept in the view.
pub trait ClusterObject: Clone + fmt::Debug + Send + Sync + 'static {
    /// Kind this type belongs to.
    const KIND: ResourceKind;

    /// Identity key used for upsert and delete matching.
    fn key(&self) -> ObjectKey;

    /// Status string used for display classification.
    fn status(&self) -> &str;

    /// Check that identity fields are present.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing identity field.
    fn validate(&self) -> Result<(), String>;

    /// Fill in the namespace from the event scope when the payload omits it.
    fn inherit_namespace(&mut self, _namespace: &str) {}
}

/// An address reported for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Address type (`InternalIP`, `Hostname`, ...).
    #[serde(rename = "type")]
    pub address_type: String,
    /// The address itself.
    pub address: String,
}

/// A cluster node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    /// Node name.
    pub name: String,
    /// Readiness status (`Ready`, `NotReady`, ...).
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// CPU capacity, as a Kubernetes quantity.
    pub cpu_capacity: String,
    /// Memory capacity, as a Kubernetes quantity.
    pub memory_capacity: String,
    /// Pod capacity.
    pub pod_capacity: String,
    /// Allocatable CPU.
    pub cpu_allocatable: Option<String>,
    /// Allocatable memory.
    pub memory_allocatable: Option<String>,
    /// Labels.
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
    /// Addresses.
    #[serde(deserialize_with = "null_as_default")]
    pub addresses: Vec<NodeAddress>,
}

impl ClusterObject for Node {
    const KIND: ResourceKind = ResourceKind::Nodes;

    fn key(&self) -> ObjectKey {
        ObjectKey::cluster(&self.name)
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("node name is empty".to_string());
        }
        Ok(())
    }
}

/// A container inside a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Whether the container is ready.
    pub ready: bool,
    /// Restart count.
    pub restart_count: Option<i32>,
    /// Current state (`running`, `waiting`, ...).
    pub state: Option<String>,
}

/// A pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    /// Pod name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Phase-derived status (`Running`, `Pending`, ...).
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    /// Extra status detail (for example `CrashLoopBackOff`).
    pub status_detail: Option<String>,
    /// Ready containers, as `ready/total`.
    pub ready_containers: Option<String>,
    /// Raw phase.
    pub phase: Option<String>,
    /// Node the pod is scheduled on.
    #[serde(deserialize_with = "null_as_default")]
    pub node: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Labels.
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
    /// Containers.
    #[serde(deserialize_with = "null_as_default")]
    pub containers: Vec<Container>,
    /// Total restarts across containers.
    pub restart_count: Option<i32>,
    /// CPU request.
    pub cpu_request: Option<String>,
    /// CPU limit.
    pub cpu_limit: Option<String>,
    /// Memory request.
    pub memory_request: Option<String>,
    /// Memory limit.
    pub memory_limit: Option<String>,
    /// Number of containers.
    pub container_count: Option<i32>,
    /// Human-readable age.
    pub age: Option<String>,
}

impl ClusterObject for Pod {
    const KIND: ResourceKind = ResourceKind::Pods;

    fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(&self.namespace, &self.name)
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("pod name is empty".to_string());
        }
        if self.namespace.is_empty() {
            return Err(format!("pod {} has no namespace", self.name));
        }
        Ok(())
    }

    fn inherit_namespace(&mut self, namespace: &str) {
        if self.namespace.is_empty() {
            self.namespace = namespace.to_string();
        }
    }
}

/// A namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,
    /// Phase (`Active`, `Terminating`).
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Labels.
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

impl ClusterObject for Namespace {
    const KIND: ResourceKind = ResourceKind::Namespaces;

    fn key(&self) -> ObjectKey {
        ObjectKey::cluster(&self.name)
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("namespace name is empty".to_string());
        }
        Ok(())
    }
}

/// A deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deployment {
    /// Deployment name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Desired replicas.
    pub replicas: i32,
    /// Ready replicas.
    pub ready_replicas: i32,
    /// Available replicas.
    pub available_replicas: i32,
    /// Updated replicas.
    pub updated_replicas: Option<i32>,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Labels.
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

impl Deployment {
    const AVAILABLE: &'static str = "Available";
    const PROGRESSING: &'static str = "Progressing";
    const UNAVAILABLE: &'static str = "Unavailable";
}

impl ClusterObject for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployments;

    fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(&self.namespace, &self.name)
    }

    fn status(&self) -> &str {
        if self.available_replicas >= self.replicas {
            Self::AVAILABLE
        } else if self.ready_replicas == 0 {
            Self::UNAVAILABLE
        } else {
            Self::PROGRESSING
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("deployment name is empty".to_string());
        }
        if self.namespace.is_empty() {
            return Err(format!("deployment {} has no namespace", self.name));
        }
        Ok(())
    }

    fn inherit_namespace(&mut self, namespace: &str) {
        if self.namespace.is_empty() {
            self.namespace = namespace.to_string();
        }
    }
}

/// Per-node line of the metrics summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetrics {
    /// Node name.
    pub name: String,
    /// CPU capacity.
    pub cpu_capacity: String,
    /// Memory capacity.
    pub memory_capacity: String,
    /// Pods scheduled on the node.
    pub pod_count: u32,
    /// Node status.
    pub status: String,
}

/// Aggregate cluster metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMetrics {
    /// Number of nodes.
    pub total_nodes: u32,
    /// Number of pods.
    pub total_pods: u32,
    /// Number of namespaces.
    pub total_namespaces: u32,
    /// Summed CPU capacity.
    pub cpu_capacity: String,
    /// Summed memory capacity.
    pub memory_capacity: String,
    /// Per-node breakdown.
    #[serde(deserialize_with = "null_as_default")]
    pub node_metrics: Vec<NodeMetrics>,
}

/// Backend health check response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthStatus {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Whether the backend can reach the cluster API.
    pub k8s_connected: bool,
    /// Failure reason, when unhealthy.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_kind_round_trip_names() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
        assert!("services".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_pod_key_is_namespaced() {
        let pod = Pod {
            name: "web-0".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        assert_eq!(pod.key(), ObjectKey::namespaced("default", "web-0"));
        assert_eq!(pod.key().to_string(), "default/web-0");
    }

    #[test]
    fn test_node_key_is_cluster_scoped() {
        let node = Node {
            name: "worker-1".to_string(),
            ..Default::default()
        };
        assert_eq!(node.key(), ObjectKey::cluster("worker-1"));
        assert_eq!(node.key().to_string(), "worker-1");
    }

    #[test]
    fn test_pod_from_reduced_event_shape() {
        let pod: Pod = serde_json::from_value(json!({
            "name": "api-7f9c",
            "namespace": "default",
            "status": "Running",
            "node": "worker-1",
            "restart_count": 2,
            "container_count": 1
        }))
        .unwrap();

        assert_eq!(pod.status(), "Running");
        assert_eq!(pod.restart_count, Some(2));
        assert!(pod.containers.is_empty());
        assert!(pod.created.is_none());
    }

    #[test]
    fn test_pod_from_full_rest_shape() {
        let pod: Pod = serde_json::from_value(json!({
            "name": "coredns-1",
            "namespace": "kube-system",
            "status": "Running",
            "node": "control-plane",
            "created": "2024-05-01T10:00:00Z",
            "labels": {"k8s-app": "kube-dns"},
            "containers": [{"name": "coredns", "image": "coredns:1.11", "ready": true}]
        }))
        .unwrap();

        assert_eq!(pod.containers.len(), 1);
        assert!(pod.containers[0].ready);
        assert_eq!(pod.labels.get("k8s-app").map(String::as_str), Some("kube-dns"));
        assert!(pod.created.is_some());
    }

    #[test]
    fn test_unscheduled_pod_from_watch_event() {
        // A freshly created pod: no node assigned and no phase yet.
        let pod: Pod = serde_json::from_value(json!({
            "name": "web-5d4f",
            "namespace": "default",
            "status": null,
            "node": null
        }))
        .unwrap();

        assert_eq!(pod.node, "");
        assert_eq!(pod.status(), "");
        assert!(pod.validate().is_ok());
    }

    #[test]
    fn test_rest_shapes_with_nil_labels() {
        let pod: Pod = serde_json::from_value(json!({
            "name": "job-x",
            "namespace": "batch",
            "status": "Succeeded",
            "node": "worker-2",
            "created": "2024-05-01T10:00:00Z",
            "labels": null,
            "containers": [{"name": "job", "image": "busybox", "ready": false}]
        }))
        .unwrap();
        assert!(pod.labels.is_empty());

        let ns: Namespace = serde_json::from_value(json!({
            "name": "scratch",
            "status": "Active",
            "created": "2024-05-01T10:00:00Z",
            "labels": null
        }))
        .unwrap();
        assert!(ns.labels.is_empty());

        let deploy: Deployment = serde_json::from_value(json!({
            "name": "api",
            "namespace": "default",
            "replicas": 2,
            "ready_replicas": 2,
            "available_replicas": 2,
            "labels": null
        }))
        .unwrap();
        assert_eq!(deploy.status(), "Available");

        let node: Node = serde_json::from_value(json!({
            "name": "worker-1",
            "status": "Ready",
            "labels": null,
            "addresses": null
        }))
        .unwrap();
        assert!(node.addresses.is_empty());
    }

    #[test]
    fn test_pod_validate() {
        let mut pod = Pod::default();
        assert!(pod.validate().is_err());
        pod.name = "x".to_string();
        assert!(pod.validate().is_err());
        pod.namespace = "default".to_string();
        assert!(pod.validate().is_ok());
    }

    #[test]
    fn test_deployment_status_classification() {
        let mut deploy = Deployment {
            name: "web".to_string(),
            namespace: "default".to_string(),
            replicas: 3,
            ready_replicas: 3,
            available_replicas: 3,
            ..Default::default()
        };
        assert_eq!(deploy.status(), "Available");

        deploy.available_replicas = 1;
        deploy.ready_replicas = 1;
        assert_eq!(deploy.status(), "Progressing");

        deploy.available_replicas = 0;
        deploy.ready_replicas = 0;
        assert_eq!(deploy.status(), "Unavailable");

        deploy.replicas = 0;
        assert_eq!(deploy.status(), "Available");
    }

    #[test]
    fn test_node_address_type_field() {
        let node: Node = serde_json::from_value(json!({
            "name": "worker-1",
            "status": "Ready",
            "addresses": [{"type": "InternalIP", "address": "10.0.0.4"}]
        }))
        .unwrap();
        assert_eq!(node.addresses[0].address_type, "InternalIP");
    }
}
