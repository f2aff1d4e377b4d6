//! The sweep engine: reconciliation cycles over discovered resource kinds,
//! a bounded work queue, and the worker pool that applies deletion
//! decisions.

#![forbid(unsafe_code)]

pub mod decision;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value as Json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sweep_cluster::{Cluster, EventSeverity, EventTarget, TargetEvent};
use sweep_core::{filter::ResourceFilter, Config, Decision, ResourceCoordinate};
use sweep_rules::Engine;

/// One enqueued object awaiting a decision. Owned by exactly one worker
/// between dequeue and completion.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub coord: ResourceCoordinate,
    pub namespace: Option<String>,
    pub name: String,
    /// Raw object tree as listed.
    pub object: Json,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

fn queue_capacity() -> usize {
    std::env::var("SWEEP_QUEUE_CAP")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1000)
}

/// The cleanup controller: wires the cluster seam, filter, and rules into
/// reconciliation cycles served by a bounded worker pool.
pub struct Janitor {
    cluster: Arc<dyn Cluster>,
    config: Config,
    rules: Option<Arc<Engine>>,
    filter: ResourceFilter,
}

impl Janitor {
    pub fn new(cluster: Arc<dyn Cluster>, config: Config, rules: Option<Engine>) -> Self {
        let filter = ResourceFilter::from_config(&config);
        Self {
            cluster,
            config,
            rules: rules.map(Arc::new),
            filter,
        }
    }

    /// Run until cancellation (periodic mode) or for a single cycle (once
    /// mode). The queue is closed exactly once, after the producer stops;
    /// workers drain what remains before this returns.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            workers = self.config.max_workers,
            dry_run = self.config.dry_run,
            once = self.config.once,
            "starting janitor"
        );

        let (tx, rx) = mpsc::channel::<WorkItem>(queue_capacity());
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.config.max_workers);
        for id in 0..self.config.max_workers {
            workers.push(self.spawn_worker(id, rx.clone(), cancel.clone()));
        }

        let result = if self.config.once {
            let res = self.run_cycle(&tx, &cancel).await;
            if let Err(e) = &res {
                counter!("errors_total", 1u64, "type" => "cleanup");
                error!(error = %e, "cleanup cycle failed");
            }
            res
        } else {
            self.run_periodic(&tx, &cancel).await;
            Ok(())
        };

        drop(tx);
        for handle in workers {
            let _ = handle.await;
        }
        info!("janitor stopped");
        result
    }

    async fn run_periodic(&self, tx: &mpsc::Sender<WorkItem>, cancel: &CancellationToken) {
        // The first tick fires immediately; cycles are strictly sequential.
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested; stopping cycles");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle(tx, cancel).await {
                        counter!("errors_total", 1u64, "type" => "cleanup");
                        error!(error = %e, "cleanup cycle failed");
                    }
                }
            }
        }
    }

    /// One pass over every admitted resource kind. Errors only on top-level
    /// discovery failure; everything below is recorded and skipped.
    async fn run_cycle(&self, tx: &mpsc::Sender<WorkItem>, cancel: &CancellationToken) -> Result<()> {
        debug!("starting cleanup cycle");
        let started = std::time::Instant::now();
        let result = self.scan_resources(tx, cancel).await;
        histogram!("cleanup_duration_seconds", started.elapsed().as_secs_f64());
        if result.is_ok() {
            info!("cleanup cycle completed");
        }
        result
    }

    async fn scan_resources(
        &self,
        tx: &mpsc::Sender<WorkItem>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let resources = self.cluster.discover_resources().await?;

        for coord in resources {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if !coord.listable_and_deletable() {
                continue;
            }
            if !self.filter.admits_resource(&coord.plural) {
                continue;
            }

            if coord.namespaced {
                let namespaces = match self.cluster.list_namespaces().await {
                    Ok(ns) => ns,
                    Err(e) => {
                        warn!(resource = %coord.plural, error = %e, "failed to list namespaces");
                        counter!("errors_total", 1u64, "type" => "list_namespaces");
                        continue;
                    }
                };
                for ns in namespaces {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    if !self.filter.admits_namespace(&ns) {
                        continue;
                    }
                    self.enqueue_kind(tx, cancel, &coord, Some(&ns)).await;
                }
            } else {
                self.enqueue_kind(tx, cancel, &coord, None).await;
            }
        }
        Ok(())
    }

    /// List one kind x namespace and enqueue every object. List failures
    /// never fail the cycle.
    async fn enqueue_kind(
        &self,
        tx: &mpsc::Sender<WorkItem>,
        cancel: &CancellationToken,
        coord: &ResourceCoordinate,
        namespace: Option<&str>,
    ) {
        let objects = match self.cluster.list_objects(coord, namespace).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(
                    resource = %coord.plural,
                    namespace = namespace.unwrap_or(""),
                    error = %e,
                    "failed to list resources"
                );
                counter!("errors_total", 1u64, "type" => "process_resources");
                return;
            }
        };

        for object in objects {
            let name = object
                .pointer("/metadata/name")
                .and_then(Json::as_str)
                .unwrap_or("")
                .to_string();
            counter!(
                "resources_evaluated_total",
                1u64,
                "resource" => coord.plural.clone(),
                "namespace" => namespace.unwrap_or("").to_string()
            );
            let item = WorkItem {
                coord: coord.clone(),
                namespace: namespace.map(|s| s.to_string()),
                name,
                object,
            };
            // Bounded send: when the queue is full this blocks until a
            // worker drains it, coupling list pace to worker throughput.
            tokio::select! {
                _ = cancel.cancelled() => return,
                res = tx.send(item) => {
                    if res.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn spawn_worker(&self, id: usize, rx: SharedReceiver, cancel: CancellationToken) -> JoinHandle<()> {
        let cluster = self.cluster.clone();
        let rules = self.rules.clone();
        let dry_run = self.config.dry_run;
        tokio::spawn(async move {
            debug!(worker = id, "worker started");
            loop {
                let item = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => None,
                        item = rx.recv() => item,
                    }
                };
                let Some(item) = item else { break };
                process_item(cluster.as_ref(), rules.as_deref(), dry_run, item).await;
            }
            debug!(worker = id, "worker stopped");
        })
    }
}

async fn process_item(cluster: &dyn Cluster, rules: Option<&Engine>, dry_run: bool, item: WorkItem) {
    let Decision::Delete { reason } = decision::decide(&item.object, rules, Utc::now()) else {
        return;
    };

    let namespace = item.namespace.as_deref().unwrap_or("");
    info!(
        resource = %item.coord.plural,
        namespace,
        name = %item.name,
        reason = %reason,
        "resource marked for deletion"
    );

    let target = event_target(&item);

    if dry_run {
        info!(resource = %item.coord.plural, namespace, name = %item.name, "dry run: would delete resource");
        let note = format!(
            "DRY RUN: Would delete {} {}/{} - {}",
            item.coord.plural, namespace, item.name, reason
        );
        publish(cluster, &target, EventSeverity::Normal, "DryRunDeletion", note).await;
        return;
    }

    match cluster
        .delete_object(&item.coord, item.namespace.as_deref(), &item.name)
        .await
    {
        Ok(()) => {
            info!(resource = %item.coord.plural, namespace, name = %item.name, "resource deleted");
            counter!(
                "resources_deleted_total",
                1u64,
                "resource" => item.coord.plural.clone(),
                "namespace" => namespace.to_string(),
                "reason" => reason.clone()
            );
            let note = format!(
                "Deleted {} {}/{} - {}",
                item.coord.plural, namespace, item.name, reason
            );
            publish(cluster, &target, EventSeverity::Normal, "ResourceDeleted", note).await;
        }
        Err(e) => {
            warn!(resource = %item.coord.plural, namespace, name = %item.name, error = %e, "failed to delete resource");
            counter!("errors_total", 1u64, "type" => "delete_resource");
            let note = format!(
                "Failed to delete {} {}/{}: {}",
                item.coord.plural, namespace, item.name, e
            );
            publish(cluster, &target, EventSeverity::Warning, "DeletionFailed", note).await;
        }
    }
}

fn event_target(item: &WorkItem) -> EventTarget {
    EventTarget {
        api_version: item.coord.api_version(),
        kind: item
            .object
            .get("kind")
            .and_then(Json::as_str)
            .unwrap_or(&item.coord.kind)
            .to_string(),
        namespace: item.namespace.clone(),
        name: item.name.clone(),
        uid: item
            .object
            .pointer("/metadata/uid")
            .and_then(Json::as_str)
            .unwrap_or("")
            .to_string(),
    }
}

/// Emission failures never influence the delete outcome.
async fn publish(
    cluster: &dyn Cluster,
    target: &EventTarget,
    severity: EventSeverity,
    reason: &str,
    note: String,
) {
    let event = TargetEvent {
        severity,
        reason: reason.to_string(),
        action: "Delete".to_string(),
        note,
    };
    if let Err(e) = cluster.publish_event(target, event).await {
        debug!(reason, error = %e, "failed to publish event");
    }
}
