//! scdk-config
//!
//! Layered YAML/JSON configuration for historization jobs: deep merge, canonical
//! JSON + SHA-256 hash for run attribution, secret-literal guard, unused-key
//! guard, and typed [`JobConfig`] extraction.

mod job;

pub use job::{ComparatorKind, JobConfig, RetrySettings};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
/// Warehouse credentials are resolved by the storage adapter, never from here.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "AIza",       // Google API key
    "ya29.",      // Google OAuth access token
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

/// JSON-pointer prefixes actually read by [`JobConfig::from_config_json`].
///
/// Keep in sync with job.rs. A leaf under any of these is "consumed";
/// anything else is reported as unused.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/warehouse/project_id",
    "/warehouse/dataset",
    "/tables/source",
    "/tables/destination",
    "/historize/id_column",
    "/historize/comparator",
    "/historize/retry/max_attempts",
    "/historize/retry/backoff_ms",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Compare every leaf of the merged document with [`CONSUMED_POINTERS`].
///
/// `Warn` always returns the report; `Fail` errors when anything is unused.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed_prefixes: Vec<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| p.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut unused_leaf_pointers: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !is_consumed(ptr))
        .collect();
    unused_leaf_pointers.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let first: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) not read by the job: {}. \
            Remove them or add the pointer to CONSUMED_POINTERS.",
            report.unused_leaf_pointers.len(),
            first.join(", ")
        );
    }

    Ok(report)
}

/// A leaf is consumed when a registry pointer equals it or is an ancestor of
/// it on a token boundary (`/tables/source` covers `/tables/source/x`, not
/// `/tables/sources`).
fn is_consumed(leaf: &str) -> bool {
    CONSUMED_POINTERS.iter().any(|c| {
        leaf.strip_prefix(c)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Scalar and null leaves with their JSON pointers, sorted by pointer.
/// Empty objects and arrays contribute nothing; a scalar root is `/`.
fn leaves(v: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack = vec![(String::new(), v)];
    while let Some((ptr, node)) = stack.pop() {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    let token = key.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            leaf if ptr.is_empty() => out.push(("/".to_string(), leaf)),
            leaf => out.push((ptr, leaf)),
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed job settings from the merged document.
    pub fn job(&self) -> Result<JobConfig> {
        JobConfig::from_config_json(&self.config_json)
    }
}

/// Load and merge config files; later paths override earlier ones.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut layers = Vec::with_capacity(paths.len());
    for p in paths {
        let raw = fs::read_to_string(p).with_context(|| format!("failed to read config path: {p}"))?;
        layers.push((p.to_string(), raw));
    }
    merge_layers(layers.iter().map(|(label, raw)| (label.as_str(), raw.as_str())))
}

/// Same as [`load_layered_yaml`] over in-memory documents, labelled `doc[i]`.
/// JSON documents are accepted as-is (JSON is valid YAML).
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let labels: Vec<String> = (0..yaml_docs.len()).map(|i| format!("doc[{i}]")).collect();
    merge_layers(labels.iter().map(String::as_str).zip(yaml_docs.iter().copied()))
}

/// Parse, screen and overlay each layer in order, then hash the result.
///
/// Each layer is screened for secret literals on its own, so an error names
/// the file that carries the secret even if a later layer overrides it.
fn merge_layers<'a>(layers: impl Iterator<Item = (&'a str, &'a str)>) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (label, raw) in layers {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("CONFIG_PARSE: invalid yaml in {label}"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("CONFIG_PARSE: {label} cannot be represented as json"))?;
        if doc.is_null() {
            // empty file
            continue;
        }

        let secret = leaves(&doc)
            .into_iter()
            .find(|(_, v)| v.as_str().is_some_and(looks_like_secret));
        if let Some((ptr, _)) = secret {
            bail!("CONFIG_SECRET_DETECTED layer={label} leaf={ptr} value=REDACTED");
        }

        overlay(&mut merged, doc);
    }

    // serde_json::Map is BTreeMap-backed (no preserve_order feature), so keys
    // serialize sorted regardless of source order.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `layer` replaces the base value.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
