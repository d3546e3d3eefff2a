use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which attribute comparator the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparatorKind {
    Normalized,
    Strict,
}

impl ComparatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparatorKind::Normalized => "normalized",
            ComparatorKind::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normalized" | "normalised" => Ok(ComparatorKind::Normalized),
            "strict" => Ok(ComparatorKind::Strict),
            other => Err(anyhow!(
                "invalid /historize/comparator '{}'. expected one of: normalized | strict",
                other
            )),
        }
    }
}

/// Whole-operation retry around read -> reconcile -> write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first. 1 = no retry.
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

/// Typed job settings.
///
/// ```yaml
/// warehouse:
///   project_id: "acme-analytics"
///   dataset: "./warehouse/crm"
/// tables:
///   source: "partners"
///   destination: "partners_history"
/// historize:
///   id_column: "PartnerID"
///   comparator: "normalized"   # optional
///   retry:                     # optional
///     max_attempts: 3
///     backoff_ms: 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Attribution only; the file store does not use it.
    pub project_id: Option<String>,
    /// Dataset locator (a directory for the CSV store).
    pub dataset: String,
    pub source_table: String,
    pub destination_table: String,
    pub id_column: String,
    pub comparator: ComparatorKind,
    pub retry: RetrySettings,
}

impl JobConfig {
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let project_id = optional_str(v, "/warehouse/project_id")?;
        let dataset = required_str(v, "/warehouse/dataset")?;
        let source_table = required_str(v, "/tables/source")?;
        let destination_table = required_str(v, "/tables/destination")?;
        let id_column = required_str(v, "/historize/id_column")?;

        validate_table_name("/tables/source", &source_table)?;
        validate_table_name("/tables/destination", &destination_table)?;
        if source_table == destination_table {
            bail!(
                "CONFIG_INVALID: /tables/source and /tables/destination must differ (both '{}')",
                source_table
            );
        }

        let comparator = match optional_str(v, "/historize/comparator")? {
            Some(s) => ComparatorKind::parse(&s)?,
            None => ComparatorKind::Normalized,
        };

        let defaults = RetrySettings::default();
        let max_attempts = optional_u64(v, "/historize/retry/max_attempts")?
            .map(|n| u32::try_from(n).map_err(|_| anyhow!("CONFIG_INVALID: /historize/retry/max_attempts too large")))
            .transpose()?
            .unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            bail!("CONFIG_INVALID: /historize/retry/max_attempts must be >= 1");
        }
        let backoff_ms = optional_u64(v, "/historize/retry/backoff_ms")?.unwrap_or(defaults.backoff_ms);

        Ok(Self {
            project_id,
            dataset,
            source_table,
            destination_table,
            id_column,
            comparator,
            retry: RetrySettings {
                max_attempts,
                backoff_ms,
            },
        })
    }
}

fn required_str(v: &Value, ptr: &str) -> Result<String> {
    optional_str(v, ptr)?.ok_or_else(|| anyhow!("CONFIG_MISSING: {} is required", ptr))
}

fn optional_str(v: &Value, ptr: &str) -> Result<Option<String>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => bail!("CONFIG_INVALID: {} must not be empty", ptr),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => bail!("CONFIG_INVALID: {} must be a string, got {}", ptr, other),
    }
}

fn optional_u64(v: &Value, ptr: &str) -> Result<Option<u64>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| anyhow!("CONFIG_INVALID: {} must be a non-negative integer, got {}", ptr, n)),
    }
}

/// Table names become file names, so keep them to a safe alphabet.
fn validate_table_name(ptr: &str, name: &str) -> Result<()> {
    let ok_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !ok_chars || name.starts_with('.') {
        bail!(
            "CONFIG_INVALID: {} '{}' may only contain [A-Za-z0-9_.-] and must not start with '.'",
            ptr,
            name
        );
    }
    Ok(())
}
