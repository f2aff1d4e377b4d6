//! sweep binary: flag and environment parsing, logging and metrics
//! bootstrap, signal handling, and wiring of the janitor engine.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sweep_cluster::KubeCluster;
use sweep_core::{duration, Config};
use sweep_janitor::Janitor;
use sweep_rules::Engine;

#[derive(Parser, Debug)]
#[command(
    name = "sweep",
    version,
    about = "Clean up cluster resources based on TTL annotations and rules",
    long_about = "kube-sweep periodically scans every resource kind the cluster serves, \
decides which objects have outlived their declared lifetime (janitor/ttl and \
janitor/expires annotations, or operator-authored rules), and deletes them."
)]
struct Cli {
    /// Print what would be deleted without actually deleting
    #[arg(long, env = "SWEEP_DRY_RUN")]
    dry_run: bool,

    /// Interval between cleanup runs (extended duration grammar, e.g. 30s, 5m)
    #[arg(long, env = "SWEEP_INTERVAL", default_value = "30s", value_parser = parse_duration_arg)]
    interval: Duration,

    /// Run a single cleanup cycle and exit
    #[arg(long, env = "SWEEP_ONCE")]
    once: bool,

    /// Resource types to include (default: all)
    #[arg(long, env = "SWEEP_INCLUDE_RESOURCES", value_delimiter = ',')]
    include_resources: Vec<String>,

    /// Resource types to exclude
    #[arg(
        long,
        env = "SWEEP_EXCLUDE_RESOURCES",
        value_delimiter = ',',
        default_value = "events,controllerrevisions"
    )]
    exclude_resources: Vec<String>,

    /// Namespaces to include (default: all)
    #[arg(long, env = "SWEEP_INCLUDE_NAMESPACES", value_delimiter = ',')]
    include_namespaces: Vec<String>,

    /// Namespaces to exclude
    #[arg(
        long,
        env = "SWEEP_EXCLUDE_NAMESPACES",
        value_delimiter = ',',
        default_value = "kube-system,kube-public,kube-node-lease"
    )]
    exclude_namespaces: Vec<String>,

    /// Path to a YAML file containing cleanup rules
    #[arg(long, env = "SWEEP_RULES_FILE")]
    rules_file: Option<PathBuf>,

    /// Address for the Prometheus metrics exporter
    #[arg(long, env = "SWEEP_METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Maximum number of concurrent workers
    #[arg(long, env = "SWEEP_MAX_WORKERS", default_value_t = 10)]
    max_workers: usize,

    /// Log filter, e.g. info, debug, or a full EnvFilter directive
    #[arg(long, env = "SWEEP_LOG", default_value = "info")]
    log_level: String,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    duration::parse(s).map_err(|e| e.to_string())
}

fn init_tracing(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    match builder.with_http_listener(addr).install() {
        Ok(()) => info!(addr = %addr, "prometheus metrics exporter listening"),
        Err(e) => warn!(addr = %addr, error = %e, "failed to install metrics exporter"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    init_metrics(cli.metrics_addr);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dry_run = cli.dry_run,
        once = cli.once,
        interval = ?cli.interval,
        workers = cli.max_workers,
        "starting kube-sweep"
    );

    // A malformed rules file is a startup failure, never a partial load.
    let rules = match &cli.rules_file {
        Some(path) => {
            let engine = Engine::load_from_file(path)
                .with_context(|| format!("loading rules from {}", path.display()))?;
            info!(path = %path.display(), rules = engine.len(), "loaded cleanup rules");
            Some(engine)
        }
        None => None,
    };

    let config = Config {
        dry_run: cli.dry_run,
        interval: cli.interval,
        once: cli.once,
        include_resources: cli.include_resources,
        exclude_resources: cli.exclude_resources,
        include_namespaces: cli.include_namespaces,
        exclude_namespaces: cli.exclude_namespaces,
        max_workers: cli.max_workers,
    };

    let cluster = KubeCluster::try_default().await?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal");
        signal_token.cancel();
    });

    let janitor = Janitor::new(Arc::new(cluster), config, rules);
    janitor.run(cancel).await
}
