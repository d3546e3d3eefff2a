//! Typed job settings: required keys, defaults, validation messages.

use scdk_config::{load_layered_yaml_from_strings, ComparatorKind, JobConfig, RetrySettings};

const BASE: &str = r#"
warehouse:
  dataset: "./crm"
tables:
  source: "partners"
  destination: "partners_history"
historize:
  id_column: "PartnerID"
"#;

fn job(docs: &[&str]) -> anyhow::Result<JobConfig> {
    load_layered_yaml_from_strings(docs)?.job()
}

#[test]
fn minimal_config_gets_defaults() {
    let cfg = job(&[BASE]).unwrap();
    assert_eq!(cfg.project_id, None);
    assert_eq!(cfg.dataset, "./crm");
    assert_eq!(cfg.source_table, "partners");
    assert_eq!(cfg.destination_table, "partners_history");
    assert_eq!(cfg.id_column, "PartnerID");
    assert_eq!(cfg.comparator, ComparatorKind::Normalized);
    assert_eq!(cfg.retry, RetrySettings::default());
}

#[test]
fn overlay_sets_comparator_and_retry() {
    let overlay = r#"
warehouse:
  project_id: "acme"
historize:
  comparator: "STRICT"
  retry:
    max_attempts: 4
    backoff_ms: 100
"#;
    let cfg = job(&[BASE, overlay]).unwrap();
    assert_eq!(cfg.project_id.as_deref(), Some("acme"));
    assert_eq!(cfg.comparator, ComparatorKind::Strict);
    assert_eq!(
        cfg.retry,
        RetrySettings {
            max_attempts: 4,
            backoff_ms: 100
        }
    );
}

#[test]
fn missing_id_column_names_the_pointer() {
    let err = job(&["warehouse:\n  dataset: x\ntables:\n  source: a\n  destination: b\n"]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_MISSING"), "{msg}");
    assert!(msg.contains("/historize/id_column"), "{msg}");
}

#[test]
fn same_source_and_destination_is_rejected() {
    let overlay = "tables:\n  destination: partners\n";
    let msg = job(&[BASE, overlay]).unwrap_err().to_string();
    assert!(msg.contains("must differ"), "{msg}");
}

#[test]
fn path_like_table_name_is_rejected() {
    let overlay = "tables:\n  destination: ../etc/passwd\n";
    let msg = job(&[BASE, overlay]).unwrap_err().to_string();
    assert!(msg.contains("/tables/destination"), "{msg}");
}

#[test]
fn unknown_comparator_is_rejected() {
    let overlay = "historize:\n  comparator: fuzzy\n";
    let msg = job(&[BASE, overlay]).unwrap_err().to_string();
    assert!(msg.contains("normalized | strict"), "{msg}");
}

#[test]
fn zero_attempts_is_rejected() {
    let overlay = "historize:\n  retry:\n    max_attempts: 0\n";
    assert!(job(&[BASE, overlay]).is_err());
}

#[test]
fn non_string_id_column_is_rejected() {
    let overlay = "historize:\n  id_column: 12\n";
    let msg = job(&[BASE, overlay]).unwrap_err().to_string();
    assert!(msg.contains("must be a string"), "{msg}");
}
