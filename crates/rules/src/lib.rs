//! Operator-authored cleanup rules: YAML schema, load-time validation, CEL
//! compilation, and first-match evaluation against object trees.
//!
//! Rules impose a lifetime on objects that carry no lifetime annotations of
//! their own. Each rule selects kinds, evaluates a CEL predicate over the
//! raw object tree, and supplies the TTL applied on a match. Loading is
//! all-or-nothing: a single malformed rule prevents startup.

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use cel_interpreter::{Context, Program, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use sweep_core::duration::{self, DurationError};

/// A single cleanup rule as declared in the rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Lowercase dash identifier, unique across the file.
    pub id: String,
    /// Kind selectors: `*`, a kind name (`Pod`), or a plural (`pods`).
    pub resources: Vec<String>,
    /// CEL predicate over the free variable `object`.
    pub expression: String,
    /// Time-to-live in the extended duration grammar.
    pub ttl: String,
}

/// Top-level rules file schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse rules file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid rule id '{0}': must match ^[a-z][a-z0-9-]*$")]
    InvalidId(String),
    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),
    #[error("invalid ttl '{ttl}' in rule '{id}': {source}")]
    InvalidTtl {
        id: String,
        ttl: String,
        source: DurationError,
    },
    #[error("failed to compile expression for rule '{id}': {detail}")]
    InvalidExpression { id: String, detail: String },
}

#[derive(Debug)]
struct CompiledRule {
    rule: Rule,
    program: Program,
    ttl: Duration,
}

/// The rule evaluation engine: rules compiled once, evaluated in source
/// order, first truthy match wins.
#[derive(Debug)]
pub struct Engine {
    rules: Vec<CompiledRule>,
}

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-z][a-z0-9-]*$").unwrap());

impl Engine {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: RulesFile = serde_yaml::from_str(&data)?;
        Self::from_rules(file.rules)
    }

    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, RulesError> {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut seen = HashSet::new();

        for rule in rules {
            if !ID_PATTERN.is_match(&rule.id) {
                return Err(RulesError::InvalidId(rule.id));
            }
            if !seen.insert(rule.id.clone()) {
                return Err(RulesError::DuplicateId(rule.id));
            }
            let ttl = duration::parse(&rule.ttl).map_err(|source| RulesError::InvalidTtl {
                id: rule.id.clone(),
                ttl: rule.ttl.clone(),
                source,
            })?;
            let program =
                Program::compile(&rule.expression).map_err(|e| RulesError::InvalidExpression {
                    id: rule.id.clone(),
                    detail: e.to_string(),
                })?;
            compiled.push(CompiledRule { rule, program, ttl });
        }

        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate all rules against an object, returning the first match and
    /// its TTL. Predicate runtime errors count as non-matches.
    pub fn evaluate(&self, object: &Json) -> Option<(&Rule, Duration)> {
        let kind = object.get("kind").and_then(Json::as_str).unwrap_or("");
        for compiled in &self.rules {
            if !resource_matches(&compiled.rule.resources, kind) {
                continue;
            }
            if self.predicate_matches(compiled, object) {
                return Some((&compiled.rule, compiled.ttl));
            }
        }
        None
    }

    fn predicate_matches(&self, compiled: &CompiledRule, object: &Json) -> bool {
        let mut ctx = Context::default();
        if let Err(e) = ctx.add_variable("object", object) {
            debug!(rule = %compiled.rule.id, error = %e, "failed to bind object");
            return false;
        }
        // Reserved; always empty in this version.
        if let Err(e) = ctx.add_variable("_context", HashMap::<String, Json>::new()) {
            debug!(rule = %compiled.rule.id, error = %e, "failed to bind _context");
            return false;
        }

        match compiled.program.execute(&ctx) {
            Ok(value) => truthy(&value),
            Err(e) => {
                debug!(rule = %compiled.rule.id, error = %e, "rule expression evaluation failed");
                false
            }
        }
    }
}

fn resource_matches(resources: &[String], kind: &str) -> bool {
    resources.iter().any(|r| {
        let r = r.as_str();
        r == "*" || r == kind || r == pluralize(kind)
    })
}

/// Plural names for common kinds. The fallback appends `s` without changing
/// case, so a kind with no table entry keeps its capitalization
/// (`CustomResource` -> `CustomResources`).
pub fn pluralize(kind: &str) -> String {
    match kind {
        "Pod" => "pods".to_string(),
        "Service" => "services".to_string(),
        "Deployment" => "deployments".to_string(),
        "StatefulSet" => "statefulsets".to_string(),
        "DaemonSet" => "daemonsets".to_string(),
        "ReplicaSet" => "replicasets".to_string(),
        "ConfigMap" => "configmaps".to_string(),
        "Secret" => "secrets".to_string(),
        "PersistentVolumeClaim" => "persistentvolumeclaims".to_string(),
        "PersistentVolume" => "persistentvolumes".to_string(),
        "Namespace" => "namespaces".to_string(),
        "Ingress" => "ingresses".to_string(),
        "NetworkPolicy" => "networkpolicies".to_string(),
        _ => {
            debug!(kind, "no plural mapping; appending 's' without case change");
            format!("{}s", kind)
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::List(items) => !items.is_empty(),
        Value::Map(map) => !map.map.is_empty(),
        _ => false,
    }
}
