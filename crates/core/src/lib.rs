//! Shared types for the sweep controller: configuration, resource
//! coordinates, decisions, and the parsing leaves (durations, expiration
//! timestamps, include/exclude filters).

#![forbid(unsafe_code)]

pub mod duration;
pub mod expires;
pub mod filter;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Annotation declaring a relative time-to-live, in the extended grammar.
pub const ANNOTATION_TTL: &str = "janitor/ttl";
/// Annotation declaring an absolute expiration timestamp.
pub const ANNOTATION_EXPIRES: &str = "janitor/expires";

/// Controller configuration, assembled by the CLI from flags and env vars.
#[derive(Debug, Clone)]
pub struct Config {
    /// Compute decisions and emit events/metrics, but never issue deletes.
    pub dry_run: bool,
    /// Gap between cleanup cycles in periodic mode.
    pub interval: Duration,
    /// Run a single cycle and exit.
    pub once: bool,
    pub include_resources: Vec<String>,
    pub exclude_resources: Vec<String>,
    pub include_namespaces: Vec<String>,
    pub exclude_namespaces: Vec<String>,
    /// Worker-pool size.
    pub max_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: false,
            interval: Duration::from_secs(30),
            once: false,
            include_resources: Vec::new(),
            exclude_resources: Vec::new(),
            include_namespaces: Vec::new(),
            exclude_namespaces: Vec::new(),
            max_workers: 10,
        }
    }
}

/// A resource kind as served by the cluster API: the (group, version,
/// plural) triple plus scope and the verb set advertised by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCoordinate {
    pub group: String,
    pub version: String,
    /// Plural name used in API paths (e.g. "deployments").
    pub plural: String,
    /// Kind name (e.g. "Deployment"); kept for event references and typed
    /// API metadata.
    pub kind: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ResourceCoordinate {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Only kinds advertising both `list` and `delete` are worth scanning.
    pub fn listable_and_deletable(&self) -> bool {
        self.verbs.iter().any(|v| v == "list") && self.verbs.iter().any(|v| v == "delete")
    }
}

/// Outcome of evaluating a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Keep,
    /// The reason is a short phrase naming the trigger, e.g.
    /// `TTL expired (age: 2h3m, ttl: 1h)`.
    Delete { reason: String },
}

impl Decision {
    pub fn is_delete(&self) -> bool {
        matches!(self, Decision::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_omits_empty_group() {
        let core = ResourceCoordinate {
            group: String::new(),
            version: "v1".into(),
            plural: "pods".into(),
            kind: "Pod".into(),
            namespaced: true,
            verbs: vec!["list".into(), "delete".into()],
        };
        assert_eq!(core.api_version(), "v1");

        let grouped = ResourceCoordinate { group: "apps".into(), ..core };
        assert_eq!(grouped.api_version(), "apps/v1");
    }

    #[test]
    fn verb_check_requires_both() {
        let mut coord = ResourceCoordinate {
            group: String::new(),
            version: "v1".into(),
            plural: "pods".into(),
            kind: "Pod".into(),
            namespaced: true,
            verbs: vec!["list".into()],
        };
        assert!(!coord.listable_and_deletable());
        coord.verbs.push("delete".into());
        assert!(coord.listable_and_deletable());
    }
}
