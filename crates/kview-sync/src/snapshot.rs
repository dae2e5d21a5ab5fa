//! Point-in-time snapshots over the REST API.
//!
//! A [`SnapshotSource`] fetches full listings; a [`SnapshotLoader`] feeds them
//! into a [`ClusterView`] and turns failures into per-kind error state.

use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::{NamespaceFilter, SnapshotTarget, StoredKind};
use crate::types::{ClusterMetrics, Deployment, HealthStatus, Namespace, Node, Pod, ResourceKind};
use crate::view::ClusterView;

/// Source of full listings for each kind.
pub trait SnapshotSource: Send + Sync {
    /// All nodes.
    fn list_nodes(&self) -> impl Future<Output = SyncResult<Vec<Node>>> + Send;

    /// Pods in the filtered namespaces.
    fn list_pods(
        &self,
        filter: &NamespaceFilter,
    ) -> impl Future<Output = SyncResult<Vec<Pod>>> + Send;

    /// All namespaces.
    fn list_namespaces(&self) -> impl Future<Output = SyncResult<Vec<Namespace>>> + Send;

    /// Deployments in the filtered namespaces.
    fn list_deployments(
        &self,
        filter: &NamespaceFilter,
    ) -> impl Future<Output = SyncResult<Vec<Deployment>>> + Send;

    /// Cluster-wide metrics summary.
    fn cluster_metrics(&self) -> impl Future<Output = SyncResult<ClusterMetrics>> + Send;

    /// Backend health.
    fn health(&self) -> impl Future<Output = SyncResult<HealthStatus>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`SnapshotSource`] backed by the dashboard REST API.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSnapshotSource {
    /// Build a source from the API URL and request timeout in `config`.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let mut base = Url::parse(&config.api_url)
            .map_err(|e| SyncError::Config(format!("invalid api_url {}: {e}", config.api_url)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, base })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn get<B: DeserializeOwned>(
        &self,
        target: &str,
        path: &str,
        namespace: Option<&NamespaceFilter>,
    ) -> SyncResult<B> {
        let url = self
            .base
            .join(path)
            .map_err(|e| SyncError::Config(format!("invalid endpoint {path}: {e}")))?;

        let mut request = self.client.get(url);
        if let Some(filter) = namespace {
            request = request.query(&[("namespace", filter.as_query())]);
        }

        debug!(kind = target, path, "Fetching snapshot");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Snapshot {
                kind: target.to_string(),
                message: error_message(status, &body),
            });
        }

        Ok(response.json::<B>().await?)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: Option<&NamespaceFilter>,
    ) -> SyncResult<Vec<T>> {
        let path = format!("api/{}", kind.as_str());
        let body: Value = self.get(kind.as_str(), &path, namespace).await?;
        list_items(kind, body)
    }
}

impl SnapshotSource for HttpSnapshotSource {
    async fn list_nodes(&self) -> SyncResult<Vec<Node>> {
        self.list(ResourceKind::Nodes, None).await
    }

    async fn list_pods(&self, filter: &NamespaceFilter) -> SyncResult<Vec<Pod>> {
        self.list(ResourceKind::Pods, Some(filter)).await
    }

    async fn list_namespaces(&self) -> SyncResult<Vec<Namespace>> {
        self.list(ResourceKind::Namespaces, None).await
    }

    async fn list_deployments(&self, filter: &NamespaceFilter) -> SyncResult<Vec<Deployment>> {
        self.list(ResourceKind::Deployments, Some(filter)).await
    }

    async fn cluster_metrics(&self) -> SyncResult<ClusterMetrics> {
        self.get("metrics", "api/metrics", None).await
    }

    async fn health(&self) -> SyncResult<HealthStatus> {
        self.get("health", "health", None).await
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => format!("HTTP {status}"),
    }
}

/// Pull the item array out of a list body.
///
/// Accepts `{"<kind>": [...]}`, `{"items": [...]}` or a bare array. A null
/// array is an empty listing.
fn list_items<T: DeserializeOwned>(kind: ResourceKind, body: Value) -> SyncResult<Vec<T>> {
    let items = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => match map.remove(kind.as_str()).or_else(|| map.remove("items")) {
            Some(items) => items,
            None => {
                return Err(SyncError::snapshot(
                    kind,
                    format!("response has no {kind} field"),
                ));
            }
        },
        other => {
            return Err(SyncError::snapshot(
                kind,
                format!("unexpected response body: {other}"),
            ));
        }
    };

    if items.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(items).map_err(|e| SyncError::snapshot(kind, e.to_string()))
}

/// Loads snapshots from a source into a view.
#[derive(Debug, Clone)]
pub struct SnapshotLoader<S> {
    source: S,
    view: ClusterView,
}

impl<S: SnapshotSource> SnapshotLoader<S> {
    /// Create a loader writing into `view`.
    pub fn new(source: S, view: ClusterView) -> Self {
        Self { source, view }
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reload one kind. Returns `true` on success.
    ///
    /// Pods and deployments are loaded for the view's selected namespace.
    pub async fn refresh(&self, kind: ResourceKind) -> bool {
        let filter = self.view.read().selected_namespace().clone();
        match kind {
            ResourceKind::Nodes => self.load(kind, self.source.list_nodes()).await,
            ResourceKind::Pods => self.load(kind, self.source.list_pods(&filter)).await,
            ResourceKind::Namespaces => self.load(kind, self.source.list_namespaces()).await,
            ResourceKind::Deployments => {
                self.load(kind, self.source.list_deployments(&filter)).await
            }
        }
    }

    /// Reload the metrics summary. Returns `true` on success.
    pub async fn refresh_metrics(&self) -> bool {
        self.view
            .write(|store| store.mark_loading(SnapshotTarget::Metrics));

        match self.source.cluster_metrics().await {
            Ok(metrics) => {
                self.view.write(|store| store.set_metrics(metrics));
                true
            }
            Err(e) => {
                warn!(error = %e, "Metrics snapshot failed");
                self.view
                    .write(|store| store.record_error(SnapshotTarget::Metrics, e.to_string()));
                false
            }
        }
    }

    /// Reload every kind and the metrics summary concurrently.
    ///
    /// Returns the number of targets that loaded successfully.
    pub async fn refresh_all(&self) -> usize {
        let (nodes, pods, namespaces, deployments, metrics) = futures::join!(
            self.refresh(ResourceKind::Nodes),
            self.refresh(ResourceKind::Pods),
            self.refresh(ResourceKind::Namespaces),
            self.refresh(ResourceKind::Deployments),
            self.refresh_metrics(),
        );
        let loaded = [nodes, pods, namespaces, deployments, metrics]
            .into_iter()
            .filter(|ok| *ok)
            .count();
        info!(loaded, total = 5, "Snapshot refresh complete");
        loaded
    }

    async fn load<T, F>(&self, kind: ResourceKind, fetch: F) -> bool
    where
        T: StoredKind,
        F: Future<Output = SyncResult<Vec<T>>>,
    {
        self.view.write(|store| store.mark_loading(kind.into()));

        match fetch.await {
            Ok(items) => {
                debug!(kind = %kind, count = items.len(), "Snapshot loaded");
                self.view.write(|store| store.replace_snapshot(items));
                true
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Snapshot failed");
                self.view
                    .write(|store| store.record_error(kind.into(), e.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Change;
    use crate::types::ObjectKey;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct FakeSource {
        pods: Mutex<Option<Vec<Pod>>>,
        pod_filters: Mutex<Vec<NamespaceFilter>>,
    }

    impl FakeSource {
        fn with_pods(pods: Vec<Pod>) -> Self {
            Self {
                pods: Mutex::new(Some(pods)),
                ..Self::default()
            }
        }
    }

    impl SnapshotSource for FakeSource {
        async fn list_nodes(&self) -> SyncResult<Vec<Node>> {
            Ok(vec![Node {
                name: "worker-1".to_string(),
                status: "Ready".to_string(),
                ..Default::default()
            }])
        }

        async fn list_pods(&self, filter: &NamespaceFilter) -> SyncResult<Vec<Pod>> {
            self.pod_filters.lock().push(filter.clone());
            self.pods
                .lock()
                .clone()
                .ok_or_else(|| SyncError::snapshot(ResourceKind::Pods, "backend unavailable"))
        }

        async fn list_namespaces(&self) -> SyncResult<Vec<Namespace>> {
            Ok(Vec::new())
        }

        async fn list_deployments(&self, _filter: &NamespaceFilter) -> SyncResult<Vec<Deployment>> {
            Err(SyncError::snapshot(ResourceKind::Deployments, "forbidden"))
        }

        async fn cluster_metrics(&self) -> SyncResult<ClusterMetrics> {
            Ok(ClusterMetrics {
                total_nodes: 1,
                total_pods: 2,
                ..Default::default()
            })
        }

        async fn health(&self) -> SyncResult<HealthStatus> {
            Ok(HealthStatus {
                status: "healthy".to_string(),
                k8s_connected: true,
                error: None,
            })
        }
    }

    fn pod(name: &str) -> Pod {
        Pod {
            name: name.to_string(),
            namespace: "default".to_string(),
            status: "Running".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_kind() {
        let view = ClusterView::new();
        view.write(|s| s.apply_event(Change::Upsert(pod("stale"))));
        let loader = SnapshotLoader::new(FakeSource::with_pods(vec![pod("a"), pod("b")]), view.clone());

        assert!(loader.refresh(ResourceKind::Pods).await);

        let store = view.read();
        assert_eq!(store.pods().len(), 2);
        assert!(!store.pods().contains(&ObjectKey::namespaced("default", "stale")));
        let status = store.load_status(SnapshotTarget::Kind(ResourceKind::Pods));
        assert!(!status.loading);
        assert!(status.error.is_none());
        assert!(status.last_loaded.is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_data() {
        let view = ClusterView::new();
        view.write(|s| s.apply_event(Change::Upsert(pod("web"))));
        let loader = SnapshotLoader::new(FakeSource::default(), view.clone());

        assert!(!loader.refresh(ResourceKind::Pods).await);

        let store = view.read();
        assert_eq!(store.pods().len(), 1);
        let error = store.error(ResourceKind::Pods.into()).unwrap();
        assert!(error.contains("backend unavailable"));
        assert!(!store.load_status(ResourceKind::Pods.into()).loading);
    }

    #[tokio::test]
    async fn test_refresh_uses_selected_namespace() {
        let view = ClusterView::new();
        view.select_namespace(NamespaceFilter::parse("kube-system"));
        let loader = SnapshotLoader::new(FakeSource::with_pods(Vec::new()), view);

        loader.refresh(ResourceKind::Pods).await;

        assert_eq!(
            *loader.source().pod_filters.lock(),
            vec![NamespaceFilter::Only("kube-system".to_string())]
        );
    }

    #[tokio::test]
    async fn test_refresh_all_counts_successes() {
        let view = ClusterView::new();
        let loader = SnapshotLoader::new(FakeSource::with_pods(vec![pod("a")]), view.clone());

        let loaded = loader.refresh_all().await;

        assert_eq!(loaded, 4);
        let store = view.read();
        assert_eq!(store.nodes().len(), 1);
        assert_eq!(store.metrics().map(|m| m.total_pods), Some(2));
        assert!(store.error(ResourceKind::Deployments.into()).is_some());
        assert!(store.error(ResourceKind::Pods.into()).is_none());
    }

    #[test]
    fn test_list_items_shapes() {
        let keyed: Vec<Pod> =
            list_items(ResourceKind::Pods, json!({"pods": [{"name": "a"}], "count": 1})).unwrap();
        assert_eq!(keyed.len(), 1);

        let items: Vec<Pod> = list_items(ResourceKind::Pods, json!({"items": [{"name": "a"}]})).unwrap();
        assert_eq!(items.len(), 1);

        let bare: Vec<Pod> = list_items(ResourceKind::Pods, json!([{"name": "a"}, {"name": "b"}])).unwrap();
        assert_eq!(bare.len(), 2);

        let null: Vec<Pod> = list_items(ResourceKind::Pods, json!({"pods": null, "count": 0})).unwrap();
        assert!(null.is_empty());
    }

    #[test]
    fn test_list_items_missing_field() {
        let result: SyncResult<Vec<Pod>> = list_items(ResourceKind::Pods, json!({"count": 0}));
        let err = result.unwrap_err();
        assert!(matches!(err, SyncError::Snapshot { ref kind, .. } if kind == "pods"));
    }

    #[test]
    fn test_error_message_prefers_backend_text() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"pods is forbidden"}"#),
            "pods is forbidden"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>"),
            "HTTP 502 Bad Gateway"
        );
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let config = SyncConfig::default().with_api_url("http://localhost:8080/kview");
        let source = HttpSnapshotSource::new(&config).unwrap();
        assert_eq!(source.base_url().as_str(), "http://localhost:8080/kview/");
        assert_eq!(
            source.base_url().join("api/pods").unwrap().as_str(),
            "http://localhost:8080/kview/api/pods"
        );
    }
}
