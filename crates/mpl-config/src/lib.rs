//! mpl-config
//!
//! Layered YAML configuration for the fixture-sync tools.
//!
//! - Documents merge in order: earlier docs are the base, later docs override.
//! - The merged document is converted to JSON, checked for secret literals,
//!   canonicalised and hashed (SHA-256 hex) so a sync run can be attributed
//!   to the exact configuration it used.
//! - Typed settings are extracted from the merged JSON by [`settings`].

mod pointer;
pub mod secrets;
pub mod settings;

pub use secrets::{resolve_provider_secrets, ResolvedProviderSecrets};
pub use settings::{AppSettings, DaemonSettings, ProviderSettings, SyncSettings};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
/// Config files carry env var NAMES, never the key material itself.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
    "postgres://", // connection strings carry credentials
    "postgresql://",
];

/// Which binary is consuming the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// One-shot `mpl sync ...` invocations.
    Sync,
    /// The long-running scheduler.
    Daemon,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Sync => "SYNC",
            ConfigMode::Daemon => "DAEMON",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
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

/// Registry of consumed JSON-pointer prefixes per mode.
///
/// Must reflect what [`AppSettings::from_config_json`] and the binaries
/// actually read. A leaf under any listed prefix counts as consumed.
pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Sync => &[
            "/sync/anchor_weekday",
            "/sync/window_timezone",
            "/sync/deadline_offset_minutes",
            "/sync/unparseable_label",
            "/provider/base_url",
            "/provider/keys_env/api_key",
            "/provider/timeout_secs",
        ],
        ConfigMode::Daemon => &[
            "/sync/anchor_weekday",
            "/sync/window_timezone",
            "/sync/deadline_offset_minutes",
            "/sync/unparseable_label",
            "/provider/base_url",
            "/provider/keys_env/api_key",
            "/provider/timeout_secs",
            "/daemon/addr",
            "/daemon/interval_secs",
        ],
    }
}

/// Compare the document's leaves against what `mode` reads.
///
/// `Warn` always returns the report; `Fail` turns a non-empty report into an
/// error naming the first offending keys.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed_prefixes: Vec<String> = consumed_pointers_for_mode(mode)
        .iter()
        .map(|p| pointer::normalize(p))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let unused_leaf_pointers: Vec<String> = pointer::leaves(config_json)
        .into_iter()
        .map(|(path, _)| path)
        .filter(|leaf| !consumed_prefixes.iter().any(|p| pointer::covers(p, leaf)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(UNUSED_PREVIEW)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS mode={} count={} keys={:?}",
            report.mode,
            report.unused_leaf_pointers.len(),
            shown
        );
    }

    Ok(report)
}

const UNUSED_PREVIEW: usize = 12;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// SHA-256 (lower-case hex) of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document (defaults fill missing keys).
    pub fn settings(&self) -> Result<AppSettings> {
        AppSettings::from_config_json(&self.config_json)
    }
}

/// Read and merge YAML files, first path as the base.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("cannot read config file {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(serde_json::Map::new());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value = serde_yaml::from_str(raw)
            .with_context(|| format!("config layer {layer} is not valid yaml"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("config layer {layer} cannot be represented as json"))?;
        // An empty document parses as null; it must not wipe earlier layers.
        if !doc.is_null() {
            overlay(&mut merged, doc);
        }
    }

    refuse_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&with_sorted_keys(&merged))
        .context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (key, top_val) in top_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, top_val),
                    None => {
                        base_map.insert(key, top_val);
                    }
                }
            }
        }
        (slot, other) => *slot = other,
    }
}

/// Rebuild objects with keys in lexical order so the hash ignores the key
/// order of the YAML input.
fn with_sorted_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), with_sorted_keys(&map[k.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(with_sorted_keys).collect()),
        other => other.clone(),
    }
}

fn refuse_secret_literals(doc: &Value) -> Result<()> {
    let hit = pointer::leaves(doc)
        .into_iter()
        .find(|(_, v)| v.as_str().is_some_and(looks_like_secret));
    if let Some((path, _)) = hit {
        bail!("CONFIG_SECRET_DETECTED leaf={path} value=REDACTED");
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
