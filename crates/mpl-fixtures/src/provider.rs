//! Provider boundary for season fixture feeds.
//!
//! Defines the fixture record, the error type and the provider trait only.
//! Concrete feeds live in sibling modules.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A scheduled match as reported by the upstream feed, before it is
/// reconciled into local rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// The feed's stable id for this match; the deduplication key.
    pub external_id: i64,
    pub kickoff_utc: DateTime<Utc>,
    /// Feed's round name, e.g. `"Regular Season - 12"`.
    pub round_label: String,
    pub home_team_external_id: i64,
    pub away_team_external_id: i64,
}

/// Errors that a [`FixtureProvider`] implementation may return.
#[derive(Debug)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream API returned an application-level error.
    Api { code: Option<u16>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The caller's cancellation token fired while the request was in flight.
    Cancelled,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Api {
                code: Some(c),
                message,
            } => write!(f, "provider api error code={c}: {message}"),
            ProviderError::Api {
                code: None,
                message,
            } => write!(f, "provider api error: {message}"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::Cancelled => write!(f, "provider request cancelled"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Upstream fixture feed contract.
///
/// Object-safe so callers can hold an `Arc<dyn FixtureProvider>`; `Send + Sync`
/// so one instance can serve the daemon's scheduled and on-demand syncs.
#[async_trait::async_trait]
pub trait FixtureProvider: Send + Sync {
    /// Human-readable name identifying this feed (e.g. `"api-sports"`).
    fn source_name(&self) -> &'static str;

    /// Round labels known to the feed for the competition season, in the
    /// feed's order.
    async fn round_labels(
        &self,
        competition_id: i64,
        season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ProviderError>;

    /// Every fixture of the competition season.
    async fn season_fixtures(
        &self,
        competition_id: i64,
        season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fixture>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFeed {
        labels: Vec<String>,
    }

    #[async_trait::async_trait]
    impl FixtureProvider for StaticFeed {
        fn source_name(&self) -> &'static str {
            "static"
        }

        async fn round_labels(
            &self,
            _competition_id: i64,
            _season_year: i32,
            _cancel: &CancellationToken,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(self.labels.clone())
        }

        async fn season_fixtures(
            &self,
            _competition_id: i64,
            _season_year: i32,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Fixture>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn provider_error_display_api_with_code() {
        let err = ProviderError::Api {
            code: Some(499),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "provider api error code=499: rate limited");
    }

    #[test]
    fn provider_error_display_api_no_code() {
        let err = ProviderError::Api {
            code: None,
            message: "bad league".to_string(),
        };
        assert_eq!(err.to_string(), "provider api error: bad league");
    }

    #[tokio::test]
    async fn provider_is_object_safe_via_arc() {
        let feed: std::sync::Arc<dyn FixtureProvider> = std::sync::Arc::new(StaticFeed {
            labels: vec!["Regular Season - 1".to_string()],
        });
        let labels = feed
            .round_labels(39, 2024, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(labels, vec!["Regular Season - 1".to_string()]);
        assert_eq!(feed.source_name(), "static");
    }
}
