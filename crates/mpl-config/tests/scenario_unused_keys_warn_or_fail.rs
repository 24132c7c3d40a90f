use mpl_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

/// Unused-key guard.
///
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys under consumed prefixes are not flagged.
/// 4) Daemon keys are unused for one-shot sync, consumed for the daemon.

const YAML: &str = r#"
sync:
  anchor_weekday: "wednesday"
  deadline_offset_minutes: 30
daemon:
  interval_secs: 600
legacy:
  poll_minutes: 5
"#;

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Sync, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/daemon/interval_secs".to_string(),
            "/legacy/poll_minutes".to_string()
        ]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS"));
    assert!(msg.contains("/legacy/poll_minutes"));
    assert!(!msg.contains("/daemon/interval_secs"));
}

#[test]
fn consumed_keys_only_is_clean() {
    let yaml = r#"
sync:
  window_timezone: "Europe/London"
provider:
  timeout_secs: 10
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Sync, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
