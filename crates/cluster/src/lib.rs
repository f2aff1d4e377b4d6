//! The platform seam: resource discovery, dynamic list/delete, namespace
//! enumeration, and event emission behind one trait.

#![forbid(unsafe_code)]

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams},
    core::ApiResource,
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client,
};
use serde_json::Value as Json;
use tracing::warn;

use sweep_core::ResourceCoordinate;

/// Severity of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// Reference to the object an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTarget {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub uid: String,
}

/// A cluster event to publish against a target object.
#[derive(Debug, Clone)]
pub struct TargetEvent {
    pub severity: EventSeverity,
    /// Machine-readable reason, e.g. `ResourceDeleted`.
    pub reason: String,
    pub action: String,
    /// Human-readable message.
    pub note: String,
}

/// Everything the controller needs from the platform.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Server-preferred resources across the core API and all groups.
    /// Individual group failures are skipped with a warning; only a
    /// top-level discovery failure is an error.
    async fn discover_resources(&self) -> Result<Vec<ResourceCoordinate>>;

    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// List live objects of one kind, optionally within a namespace, as raw
    /// object trees.
    async fn list_objects(
        &self,
        coord: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Result<Vec<Json>>;

    async fn delete_object(
        &self,
        coord: &ResourceCoordinate,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()>;

    /// Event emission is fire-and-forget; callers log and ignore failures.
    async fn publish_event(&self, target: &EventTarget, event: TargetEvent) -> Result<()>;
}

/// kube-rs implementation of [`Cluster`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    reporter: Reporter,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: "kube-sweep".into(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self { client, reporter }
    }

    /// Connect using in-cluster config first, kubeconfig second.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("building kubernetes client")?;
        Ok(Self::new(client))
    }

    fn dynamic_api(&self, coord: &ResourceCoordinate, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(coord);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn discover_resources(&self) -> Result<Vec<ResourceCoordinate>> {
        let mut out = Vec::new();

        let versions = self
            .client
            .list_core_api_versions()
            .await
            .context("listing core API versions")?;
        for version in &versions.versions {
            match self.client.list_core_api_resources(version).await {
                Ok(list) => collect_resources(&list, &mut out),
                Err(e) => {
                    warn!(version = %version, error = %e, "failed to list core resources; skipping")
                }
            }
        }

        let groups = self
            .client
            .list_api_groups()
            .await
            .context("listing API groups")?;
        for group in &groups.groups {
            // Server-preferred version per group, first served as fallback.
            let Some(gv) = group
                .preferred_version
                .as_ref()
                .or_else(|| group.versions.first())
            else {
                continue;
            };
            match self.client.list_api_group_resources(&gv.group_version).await {
                Ok(list) => collect_resources(&list, &mut out),
                Err(e) => {
                    warn!(group_version = %gv.group_version, error = %e, "failed to list group resources; skipping")
                }
            }
        }

        Ok(out)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("listing namespaces")?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn list_objects(
        &self,
        coord: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Result<Vec<Json>> {
        let api = self.dynamic_api(coord, namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("listing {}", coord.plural))?;

        let mut out = Vec::with_capacity(list.items.len());
        for item in list.items {
            let mut raw = serde_json::to_value(&item).context("serializing object")?;
            strip_managed_fields(&mut raw);
            out.push(raw);
        }
        Ok(out)
    }

    async fn delete_object(
        &self,
        coord: &ResourceCoordinate,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let api = self.dynamic_api(coord, namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("deleting {}/{}", coord.plural, name))?;
        Ok(())
    }

    async fn publish_event(&self, target: &EventTarget, event: TargetEvent) -> Result<()> {
        let reference = ObjectReference {
            api_version: Some(target.api_version.clone()),
            kind: Some(target.kind.clone()),
            namespace: target.namespace.clone(),
            name: Some(target.name.clone()),
            uid: Some(target.uid.clone()),
            ..Default::default()
        };
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), reference);
        recorder
            .publish(Event {
                type_: match event.severity {
                    EventSeverity::Normal => EventType::Normal,
                    EventSeverity::Warning => EventType::Warning,
                },
                reason: event.reason,
                note: Some(event.note),
                action: event.action,
                secondary: None,
            })
            .await
            .context("publishing event")?;
        Ok(())
    }
}

fn api_resource(coord: &ResourceCoordinate) -> ApiResource {
    ApiResource {
        group: coord.group.clone(),
        version: coord.version.clone(),
        api_version: coord.api_version(),
        kind: coord.kind.clone(),
        plural: coord.plural.clone(),
    }
}

fn collect_resources(list: &APIResourceList, out: &mut Vec<ResourceCoordinate>) {
    let (group, version) = split_group_version(&list.group_version);
    for r in &list.resources {
        // Subresources like pods/status are never deletable targets.
        if r.name.contains('/') {
            continue;
        }
        out.push(ResourceCoordinate {
            group: r.group.clone().unwrap_or_else(|| group.to_string()),
            version: r.version.clone().unwrap_or_else(|| version.to_string()),
            plural: r.name.clone(),
            kind: r.kind.clone(),
            namespaced: r.namespaced,
            verbs: r.verbs.clone(),
        });
    }
}

fn split_group_version(group_version: &str) -> (&str, &str) {
    match group_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", group_version),
    }
}

fn strip_managed_fields(value: &mut Json) {
    if let Some(meta) = value.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
    use serde_json::json;

    fn coord() -> ResourceCoordinate {
        ResourceCoordinate {
            group: "apps".into(),
            version: "v1".into(),
            plural: "deployments".into(),
            kind: "Deployment".into(),
            namespaced: true,
            verbs: vec!["list".into(), "delete".into()],
        }
    }

    #[test]
    fn split_group_version_handles_core_and_groups() {
        assert_eq!(split_group_version("v1"), ("", "v1"));
        assert_eq!(split_group_version("apps/v1"), ("apps", "v1"));
    }

    #[test]
    fn api_resource_carries_full_coordinates() {
        let ar = api_resource(&coord());
        assert_eq!(ar.group, "apps");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.api_version, "apps/v1");
        assert_eq!(ar.kind, "Deployment");
        assert_eq!(ar.plural, "deployments");
    }

    #[test]
    fn collect_resources_skips_subresources() {
        let list = APIResourceList {
            group_version: "v1".into(),
            resources: vec![
                APIResource {
                    name: "pods".into(),
                    kind: "Pod".into(),
                    namespaced: true,
                    verbs: vec!["list".into(), "delete".into()],
                    ..Default::default()
                },
                APIResource {
                    name: "pods/status".into(),
                    kind: "Pod".into(),
                    namespaced: true,
                    verbs: vec!["get".into(), "patch".into()],
                    ..Default::default()
                },
            ],
        };

        let mut out = Vec::new();
        collect_resources(&list, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].plural, "pods");
        assert_eq!(out[0].group, "");
        assert_eq!(out[0].version, "v1");
    }

    #[test]
    fn strip_managed_fields_removes_noise() {
        let mut obj = json!({
            "metadata": {"name": "a", "managedFields": [{"manager": "kubectl"}]},
        });
        strip_managed_fields(&mut obj);
        assert!(obj["metadata"].get("managedFields").is_none());
        assert_eq!(obj["metadata"]["name"], "a");
    }
}
