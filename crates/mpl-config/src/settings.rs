//! Typed settings extracted from the merged config JSON.
//!
//! Every key is optional in YAML; defaults reproduce the stock behaviour
//! (Wednesday-anchored UTC weeks, 30 minute deadline, skip unparseable labels).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub sync: SyncSettings,
    pub provider: ProviderSettings,
    pub daemon: DaemonSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnparseableLabel {
    /// Log, record in the sync report and carry on with the next label.
    #[default]
    Skip,
    /// Abort the season's sync.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Weekday a round window starts on (`"wednesday"`, `"wed"`, ...).
    pub anchor_weekday: String,
    /// IANA zone the window's calendar days are counted in.
    pub window_timezone: String,
    /// Prediction deadline = round start minus this many minutes.
    pub deadline_offset_minutes: i64,
    pub unparseable_label: UnparseableLabel,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            anchor_weekday: "wednesday".to_string(),
            window_timezone: "UTC".to_string(),
            deadline_offset_minutes: 30,
            unparseable_label: UnparseableLabel::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub keys_env: ProviderKeysEnv,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://v3.football.api-sports.io".to_string(),
            keys_env: ProviderKeysEnv::default(),
            timeout_secs: 20,
        }
    }
}

/// Env var NAMES holding provider credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderKeysEnv {
    pub api_key: String,
}

impl Default for ProviderKeysEnv {
    fn default() -> Self {
        Self {
            api_key: "MPL_FIXTURES_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
    /// Seconds between two scheduled sync sweeps over all enabled seasons.
    pub interval_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8898".to_string(),
            interval_secs: 3600,
        }
    }
}

/// One round window.
pub const MAX_DEADLINE_OFFSET_MINUTES: i64 = 7 * 24 * 60;

impl AppSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: AppSettings = if config_json.is_null() {
            AppSettings::default()
        } else {
            serde_json::from_value(config_json.clone()).context("invalid settings shape")?
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(0..=MAX_DEADLINE_OFFSET_MINUTES).contains(&self.sync.deadline_offset_minutes) {
            bail!(
                "CONFIG_INVALID /sync/deadline_offset_minutes must be within 0..={}, got {}",
                MAX_DEADLINE_OFFSET_MINUTES,
                self.sync.deadline_offset_minutes
            );
        }
        if self.provider.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID /provider/base_url must not be empty");
        }
        if self.provider.keys_env.api_key.trim().is_empty() {
            bail!("CONFIG_INVALID /provider/keys_env/api_key must name an env var");
        }
        if self.daemon.interval_secs == 0 {
            bail!("CONFIG_INVALID /daemon/interval_secs must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let s = AppSettings::from_config_json(&json!({})).unwrap();
        assert_eq!(s, AppSettings::default());
        assert_eq!(s.sync.anchor_weekday, "wednesday");
        assert_eq!(s.sync.deadline_offset_minutes, 30);
        assert_eq!(s.sync.unparseable_label, UnparseableLabel::Skip);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let s = AppSettings::from_config_json(&json!({
            "sync": { "unparseable_label": "fail" },
            "daemon": { "interval_secs": 60 }
        }))
        .unwrap();
        assert_eq!(s.sync.unparseable_label, UnparseableLabel::Fail);
        assert_eq!(s.sync.window_timezone, "UTC");
        assert_eq!(s.daemon.interval_secs, 60);
        assert_eq!(s.daemon.addr, "127.0.0.1:8898");
    }

    #[test]
    fn deadline_offset_longer_than_a_week_rejected() {
        let err = AppSettings::from_config_json(&json!({
            "sync": { "deadline_offset_minutes": i64::MAX }
        }))
        .unwrap_err();
        assert!(err.to_string().starts_with("CONFIG_INVALID"));

        let week = AppSettings::from_config_json(&json!({
            "sync": { "deadline_offset_minutes": MAX_DEADLINE_OFFSET_MINUTES }
        }))
        .unwrap();
        assert_eq!(week.sync.deadline_offset_minutes, 10_080);
    }

    #[test]
    fn negative_deadline_offset_rejected() {
        let err = AppSettings::from_config_json(&json!({
            "sync": { "deadline_offset_minutes": -5 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("deadline_offset_minutes"));
    }

    #[test]
    fn unknown_label_policy_rejected() {
        assert!(AppSettings::from_config_json(&json!({
            "sync": { "unparseable_label": "explode" }
        }))
        .is_err());
    }
}
