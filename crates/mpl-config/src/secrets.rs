//! Runtime secret resolution for the fixture feed.
//!
//! Config YAML stores only env var NAMES. Binaries call
//! [`resolve_provider_secrets`] once at startup and hand the result to the
//! provider constructor. `Debug` redacts values; errors name the variable,
//! never its content.

use anyhow::{bail, Result};

use crate::settings::ProviderSettings;

#[derive(Clone)]
pub struct ResolvedProviderSecrets {
    pub api_key: String,
}

impl std::fmt::Debug for ResolvedProviderSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProviderSecrets")
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

/// Resolve the provider API key from the process environment.
pub fn resolve_provider_secrets(settings: &ProviderSettings) -> Result<ResolvedProviderSecrets> {
    resolve_with(settings, |name| std::env::var(name).ok())
}

/// Same as [`resolve_provider_secrets`] with an injectable lookup (tests).
pub fn resolve_with<F>(settings: &ProviderSettings, lookup: F) -> Result<ResolvedProviderSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let var = settings.keys_env.api_key.as_str();
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => Ok(ResolvedProviderSecrets {
            api_key: v.trim().to_string(),
        }),
        Some(_) => bail!("SECRET_EMPTY env var {} is set but empty", var),
        None => bail!("SECRET_MISSING env var {} is not set", var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_named_variable() {
        let settings = ProviderSettings::default();
        let got = resolve_with(&settings, |name| {
            (name == "MPL_FIXTURES_API_KEY").then(|| " abc123 ".to_string())
        })
        .unwrap();
        assert_eq!(got.api_key, "abc123");
    }

    #[test]
    fn missing_variable_names_the_var_only() {
        let settings = ProviderSettings::default();
        let err = resolve_with(&settings, |_| None).unwrap_err();
        assert!(err.to_string().contains("MPL_FIXTURES_API_KEY"));
    }

    #[test]
    fn debug_redacts_value() {
        let s = ResolvedProviderSecrets {
            api_key: "super-secret".to_string(),
        };
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("REDACTED"));
    }
}
