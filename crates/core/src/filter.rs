//! Include/exclude filtering over resource kinds and namespaces. Empty
//! include sets admit everything; excludes always dominate.

use std::collections::HashSet;

use crate::Config;

#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    include_resources: HashSet<String>,
    exclude_resources: HashSet<String>,
    include_namespaces: HashSet<String>,
    exclude_namespaces: HashSet<String>,
}

impl ResourceFilter {
    pub fn new(
        include_resources: &[String],
        exclude_resources: &[String],
        include_namespaces: &[String],
        exclude_namespaces: &[String],
    ) -> Self {
        Self {
            include_resources: include_resources.iter().cloned().collect(),
            exclude_resources: exclude_resources.iter().cloned().collect(),
            include_namespaces: include_namespaces.iter().cloned().collect(),
            exclude_namespaces: exclude_namespaces.iter().cloned().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.include_resources,
            &config.exclude_resources,
            &config.include_namespaces,
            &config.exclude_namespaces,
        )
    }

    pub fn admits_resource(&self, resource: &str) -> bool {
        if self.exclude_resources.contains(resource) {
            return false;
        }
        self.include_resources.is_empty() || self.include_resources.contains(resource)
    }

    pub fn admits_namespace(&self, namespace: &str) -> bool {
        if self.exclude_namespaces.contains(namespace) {
            return false;
        }
        self.include_namespaces.is_empty() || self.include_namespaces.contains(namespace)
    }
}
