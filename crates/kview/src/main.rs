//! kview - live cluster view
//!
//! Loads cluster snapshots from a kview backend, then follows its event
//! stream to keep a local view current.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use kview_sync::config::{DEFAULT_API_URL, DEFAULT_WS_URL};
use kview_sync::{
    ClusterView, ConnectionState, HttpSnapshotSource, NamespaceFilter, ReconnectConfig,
    ResourceKind, SnapshotLoader, SnapshotSource, SnapshotTarget, SyncClient, SyncConfig,
    SyncEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kview")]
#[command(about = "Live Kubernetes cluster view")]
#[command(version)]
struct Cli {
    /// Backend event stream URL
    #[arg(long, global = true, env = "KVIEW_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// Backend REST base URL
    #[arg(long, global = true, env = "KVIEW_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, global = true, env = "KVIEW_RECONNECT_DELAY_MS", default_value_t = 3000)]
    reconnect_delay_ms: u64,

    /// Consecutive failed reconnects before giving up (0 = never)
    #[arg(long, global = true, env = "KVIEW_MAX_RECONNECT_ATTEMPTS", default_value_t = 5)]
    max_reconnect_attempts: u32,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the cluster and log a summary on every change
    Watch {
        /// Namespace to follow ("all" or empty for every namespace)
        #[arg(short, long, default_value = "")]
        namespace: String,

        /// Seconds between snapshot refreshes
        #[arg(long, default_value_t = 30)]
        refresh_secs: u64,
    },

    /// Load one snapshot of every kind and print counts
    Snapshot {
        /// Namespace for pods and deployments
        #[arg(short, long, default_value = "all")]
        namespace: String,
    },

    /// Check backend health
    Health,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        let max_attempts = (self.max_reconnect_attempts > 0).then_some(self.max_reconnect_attempts);
        SyncConfig::new(&self.ws_url, &self.api_url).with_reconnect(ReconnectConfig::fixed(
            Duration::from_millis(self.reconnect_delay_ms),
            max_attempts,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = cli.sync_config();
    config.validate()?;

    match cli.command {
        Commands::Watch {
            namespace,
            refresh_secs,
        } => {
            watch(config, NamespaceFilter::parse(&namespace), refresh_secs).await?;
        }

        Commands::Snapshot { namespace } => {
            snapshot(&config, NamespaceFilter::parse(&namespace)).await?;
        }

        Commands::Health => {
            health(&config).await?;
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("kview=info".parse()?)
        .add_directive("kview_sync=info".parse()?);

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
    }
    Ok(())
}

async fn watch(config: SyncConfig, filter: NamespaceFilter, refresh_secs: u64) -> anyhow::Result<()> {
    info!(ws_url = %config.ws_url, api_url = %config.api_url, namespace = %filter.as_query(), "starting watch");

    let view = ClusterView::new();
    view.select_namespace(filter.clone());

    let loader = SnapshotLoader::new(HttpSnapshotSource::new(&config)?, view.clone());
    let loaded = loader.refresh_all().await;
    info!(loaded, "initial snapshot loaded");

    let client = SyncClient::new(config, view.clone())?;
    client.subscribe(ResourceKind::Pods.as_str(), filter.as_namespace());
    let driver = client.start()?;

    let mut changes = view.changes();
    let mut events = client.events();
    let mut refresh = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    refresh.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("shutting down");
                client.close()?;
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                log_summary(&view, client.state());
            }
            _ = refresh.tick() => {
                loader.refresh_all().await;
                client.request_metrics();
            }
            event = events.recv() => match event {
                Ok(SyncEvent::Connected { .. }) => {
                    client.request_metrics();
                }
                Ok(SyncEvent::ReconnectFailed { attempts, last_error }) => {
                    warn!(attempts, error = %last_error, "live updates unavailable, continuing with snapshots");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "lifecycle events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    drop(client);
    if let Err(e) = driver.await {
        warn!(error = %e, "sync driver ended abnormally");
    }
    Ok(())
}

fn log_summary(view: &ClusterView, state: ConnectionState) {
    let store = view.read();
    info!(
        revision = store.revision(),
        state = %state,
        nodes = store.nodes().len(),
        pods = store.pods().len(),
        selected_pods = store.selected_pods().len(),
        deployments = store.deployments().len(),
        by_status = ?store.pods_by_status(),
        "cluster view updated"
    );
}

async fn snapshot(config: &SyncConfig, filter: NamespaceFilter) -> anyhow::Result<()> {
    let view = ClusterView::new();
    view.select_namespace(filter);

    let loader = SnapshotLoader::new(HttpSnapshotSource::new(config)?, view.clone());
    let loaded = loader.refresh_all().await;

    let store = view.read();
    println!("Snapshot ({loaded}/5 loaded)");
    println!("  nodes:       {}", store.nodes().len());
    println!("  pods:        {}", store.pods().len());
    println!("  namespaces:  {}", store.namespaces().len());
    println!("  deployments: {}", store.deployments().len());

    if !store.pods_by_status().is_empty() {
        println!();
        println!("Pods by status:");
        for (status, count) in store.pods_by_status() {
            println!("  {status:<12} {count}");
        }
    }

    let targets = ResourceKind::ALL
        .into_iter()
        .map(SnapshotTarget::from)
        .chain(std::iter::once(SnapshotTarget::Metrics));
    for target in targets {
        if let Some(error) = store.error(target) {
            println!("  {target} error: {error}");
        }
    }

    Ok(())
}

async fn health(config: &SyncConfig) -> anyhow::Result<()> {
    let source = HttpSnapshotSource::new(config)?;
    let status = source.health().await?;

    println!("Status:        {}", status.status);
    println!("Cluster API:   {}", if status.k8s_connected { "connected" } else { "unreachable" });
    if let Some(error) = status.error {
        println!("Error:         {error}");
    }

    if status.status != "healthy" {
        anyhow::bail!("backend is {}", status.status);
    }
    Ok(())
}
