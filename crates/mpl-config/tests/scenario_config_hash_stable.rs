//! Config hash stability.
//!
//! GREEN when:
//! - the same inputs hash identically across calls;
//! - reordering keys within YAML doesn't change the hash;
//! - different values produce different hashes;
//! - overlays change the hash and override the base.

use mpl_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
sync:
  anchor_weekday: "wednesday"
  window_timezone: "UTC"
  deadline_offset_minutes: 30
provider:
  base_url: "https://v3.football.api-sports.io"
  keys_env:
    api_key: "MPL_FIXTURES_API_KEY"
"#;

const BASE_YAML_REORDERED: &str = r#"
provider:
  keys_env:
    api_key: "MPL_FIXTURES_API_KEY"
  base_url: "https://v3.football.api-sports.io"
sync:
  deadline_offset_minutes: 30
  window_timezone: "UTC"
  anchor_weekday: "wednesday"
"#;

const OVERLAY_YAML: &str = r#"
sync:
  deadline_offset_minutes: 60
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();

    assert_eq!(
        a.config_hash, b.config_hash,
        "canonicalisation must make key order irrelevant"
    );
}

#[test]
fn overlay_changes_hash_and_overrides_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(
        layered.config_json["sync"]["deadline_offset_minutes"],
        serde_json::json!(60)
    );
    // untouched siblings survive the merge
    assert_eq!(
        layered.config_json["sync"]["anchor_weekday"],
        serde_json::json!("wednesday")
    );

    let settings = layered.settings().unwrap();
    assert_eq!(settings.sync.deadline_offset_minutes, 60);
}

#[test]
fn hash_is_lowercase_sha256_hex() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash.len(), 64);
    assert!(a
        .config_hash
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}
