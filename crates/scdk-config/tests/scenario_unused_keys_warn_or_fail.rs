use scdk_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) A config using only known keys is clean.
/// 4) Deterministic ordering of unused pointers.

const FULL_YAML: &str = r#"
warehouse:
  project_id: "acme"
  dataset: "./crm"
tables:
  source: "partners"
  destination: "partners_history"
historize:
  id_column: "PartnerID"
  comparator: "normalized"
  retry:
    max_attempts: 3
    backoff_ms: 250
"#;

#[test]
fn known_keys_are_clean() {
    let loaded = load_layered_yaml_from_strings(&[FULL_YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let overlay = r#"
tables:
  sourcee: "typo"
logging:
  file: "partner_history_tracker.log"
"#;
    let loaded = load_layered_yaml_from_strings(&[FULL_YAML, overlay]).unwrap();

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/logging/file".to_string(), "/tables/sourcee".to_string()]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let overlay = "unused_section:\n  foo: 1\n";
    let loaded = load_layered_yaml_from_strings(&[FULL_YAML, overlay]).unwrap();

    let result = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail);
    let msg = format!("{:?}", result.err().expect("fail policy must error"));
    assert!(msg.contains("CONFIG_UNUSED_KEYS"));
}
