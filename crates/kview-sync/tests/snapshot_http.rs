//! REST snapshot integration tests against a mock axum backend.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use kview_sync::{
    ClusterView, HttpSnapshotSource, NamespaceFilter, ObjectKey, ResourceKind, SnapshotLoader,
    SnapshotSource, SyncConfig, SyncError,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Pod listing in the shape the backend's REST handler writes: nil label maps
/// come out as `null`, and an unscheduled pod has an empty node name.
async fn list_pods(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let namespace = params.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
    let pods: Vec<_> = [
        json!({
            "name": "web", "namespace": "default", "status": "Running", "node": "worker-1",
            "created": "2024-05-01T10:00:00+02:00", "labels": {"app": "web"},
            "containers": [{"name": "web", "image": "nginx:1.27", "ready": true}]
        }),
        json!({
            "name": "coredns", "namespace": "kube-system", "status": "Running", "node": "worker-1",
            "created": "2024-05-01T10:00:00.123456789Z", "labels": null,
            "containers": [{"name": "coredns", "image": "coredns:1.11", "ready": true}]
        }),
        json!({
            "name": "job", "namespace": "default", "status": "Pending", "node": "",
            "created": "2024-05-01T10:05:00Z", "labels": null, "containers": []
        }),
    ]
    .into_iter()
    .filter(|pod| namespace == "all" || pod["namespace"] == namespace.as_str())
    .collect();
    let count = pods.len();
    Json(json!({"pods": pods, "count": count}))
}

fn backend() -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "k8s_connected": true})) }),
        )
        .route(
            "/api/nodes",
            get(|| async {
                Json(json!({
                    "nodes": [{
                        "name": "worker-1",
                        "status": "Ready",
                        "cpu_capacity": "8",
                        "memory_capacity": "32Gi",
                        "pod_capacity": "110",
                        "addresses": [{"type": "InternalIP", "address": "10.0.0.5"}]
                    }],
                    "count": 1
                }))
            }),
        )
        .route("/api/pods", get(list_pods))
        .route(
            "/api/namespaces",
            get(|| async {
                Json(json!({
                    "namespaces": [
                        {"name": "default", "status": "Active", "created": "2024-05-01T09:00:00Z", "labels": null},
                        {"name": "kube-system", "status": "Active", "created": "2024-05-01T09:00:00Z", "labels": {"kubernetes.io/metadata.name": "kube-system"}}
                    ],
                    "count": 2
                }))
            }),
        )
        .route(
            "/api/deployments",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "deployments.apps is forbidden"})),
                )
            }),
        )
        .route(
            "/api/metrics",
            get(|| async {
                Json(json!({
                    "total_nodes": 1,
                    "total_pods": 3,
                    "total_namespaces": 2,
                    "cpu_capacity": "8",
                    "memory_capacity": "32Gi"
                }))
            }),
        )
}

fn source(url: &str) -> HttpSnapshotSource {
    HttpSnapshotSource::new(&SyncConfig::default().with_api_url(url)).unwrap()
}

#[tokio::test]
async fn test_lists_nodes() {
    let url = serve(backend()).await;
    let nodes = source(&url).list_nodes().await.unwrap();

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "worker-1");
    assert_eq!(nodes[0].addresses[0].address_type, "InternalIP");
}

#[tokio::test]
async fn test_pod_namespace_query() {
    let url = serve(backend()).await;
    let source = source(&url);

    let all = source.list_pods(&NamespaceFilter::All).await.unwrap();
    assert_eq!(all.len(), 3);

    let scoped = source
        .list_pods(&NamespaceFilter::Only("kube-system".to_string()))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].name, "coredns");
}

#[tokio::test]
async fn test_listing_with_nil_labels_and_unscheduled_pod() {
    let url = serve(backend()).await;
    let source = source(&url);

    let pods = source.list_pods(&NamespaceFilter::All).await.unwrap();
    let job = pods.iter().find(|p| p.name == "job").unwrap();
    assert!(job.labels.is_empty());
    assert_eq!(job.node, "");
    assert!(job.containers.is_empty());

    let namespaces = source.list_namespaces().await.unwrap();
    assert_eq!(namespaces.len(), 2);
    assert!(namespaces.iter().any(|ns| ns.name == "default" && ns.labels.is_empty()));
}

#[tokio::test]
async fn test_backend_error_message_surfaces() {
    let url = serve(backend()).await;
    let err = source(&url)
        .list_deployments(&NamespaceFilter::All)
        .await
        .unwrap_err();

    match err {
        SyncError::Snapshot { kind, message } => {
            assert_eq!(kind, "deployments");
            assert_eq!(message, "deployments.apps is forbidden");
        }
        other => panic!("expected snapshot error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_health_and_metrics() {
    let url = serve(backend()).await;
    let source = source(&url);

    let health = source.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert!(health.k8s_connected);

    let metrics = source.cluster_metrics().await.unwrap();
    assert_eq!(metrics.total_pods, 3);
    assert!(metrics.node_metrics.is_empty());
}

#[tokio::test]
async fn test_loader_fills_view_and_records_errors() {
    let url = serve(backend()).await;
    let view = ClusterView::new();
    let loader = SnapshotLoader::new(source(&url), view.clone());

    let loaded = loader.refresh_all().await;
    assert_eq!(loaded, 4);

    let store = view.read();
    assert_eq!(store.nodes().len(), 1);
    assert_eq!(store.pods().len(), 3);
    assert_eq!(store.namespaces().len(), 2);
    assert!(store.deployments().is_empty());
    assert_eq!(store.pods_by_status().get("running"), Some(&2));
    assert_eq!(store.pods_by_status().get("pending"), Some(&1));
    assert!(store.pods().contains(&ObjectKey::namespaced("kube-system", "coredns")));
    assert!(store.error(ResourceKind::Pods.into()).is_none());
    assert_eq!(
        store.error(ResourceKind::Deployments.into()),
        Some("deployments snapshot failed: deployments.apps is forbidden")
    );
}

#[tokio::test]
async fn test_loader_uses_selected_namespace() {
    let url = serve(backend()).await;
    let view = ClusterView::new();
    view.select_namespace(NamespaceFilter::parse("default"));
    let loader = SnapshotLoader::new(source(&url), view.clone());

    assert!(loader.refresh(ResourceKind::Pods).await);
    assert_eq!(view.read().pods().len(), 2);
    assert_eq!(view.read().selected_pods().len(), 2);
}

#[tokio::test]
async fn test_unreachable_backend() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let view = ClusterView::new();
    let loader = SnapshotLoader::new(source(&url), view.clone());

    assert!(!loader.refresh(ResourceKind::Nodes).await);
    assert!(view.read().error(ResourceKind::Nodes.into()).is_some());
    assert!(view.read().nodes().is_empty());
}

#[tokio::test]
async fn test_request_timeout() {
    let app = Router::new().route(
        "/api/nodes",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"nodes": [], "count": 0}))
        }),
    );
    let url = serve(app).await;
    let config = SyncConfig::default()
        .with_api_url(url)
        .with_request_timeout(Duration::from_millis(100));
    let source = HttpSnapshotSource::new(&config).unwrap();

    let err = source.list_nodes().await.unwrap_err();
    assert!(matches!(err, SyncError::Http(ref e) if e.is_timeout()));
}
