//! API-Sports (api-football v3) backed fixture feed.
//!
//! Endpoints used:
//! - `GET /fixtures/rounds?league=<id>&season=<year>` -> round labels
//! - `GET /fixtures?league=<id>&season=<year>` -> season fixtures
//!
//! API key is resolved by the caller and passed in; do not log it.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use mpl_config::{resolve_provider_secrets, ProviderSettings};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::provider::{Fixture, FixtureProvider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";
const API_KEY_HEADER: &str = "x-apisports-key";

#[derive(Clone)]
pub struct ApiSportsProvider {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for ApiSportsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSportsProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl ApiSportsProvider {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL.to_string(), Duration::from_secs(20))
    }

    pub fn new_with_base_url(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("http client build failed: {e}")))?;
        Ok(Self {
            api_key,
            http,
            base_url,
        })
    }

    /// Build from the `provider` config section, reading the API key from
    /// the env var it names.
    pub fn from_settings(settings: &ProviderSettings) -> anyhow::Result<Self> {
        let secrets = resolve_provider_secrets(settings)?;
        Self::new_with_base_url(
            secrets.api_key,
            settings.base_url.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        competition_id: i64,
        season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, ProviderError> {
        let league = competition_id.to_string();
        let season = season_year.to_string();
        let request = self
            .http
            .get(self.url(path))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .query(&[("league", league.as_str()), ("season", season.as_str())]);

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            r = request.send() => r.map_err(|e| ProviderError::Transport(e.to_string()))?,
        };

        let status = resp.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            b = resp.bytes() => b.map_err(|e| ProviderError::Transport(e.to_string()))?,
        };

        if !status.is_success() {
            return Err(ProviderError::Api {
                code: Some(status.as_u16()),
                message: String::from_utf8_lossy(&body).chars().take(200).collect(),
            });
        }

        let envelope: ApiEnvelope<T> = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::Decode(format!("{path}: {e}")))?;

        if let Some(message) = errors_message(&envelope.errors) {
            return Err(ProviderError::Api {
                code: None,
                message,
            });
        }

        debug!(
            path,
            competition_id,
            season_year,
            items = envelope.response.len(),
            "api-sports response decoded"
        );
        Ok(envelope.response)
    }
}

#[async_trait::async_trait]
impl FixtureProvider for ApiSportsProvider {
    fn source_name(&self) -> &'static str {
        "api-sports"
    }

    async fn round_labels(
        &self,
        competition_id: i64,
        season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ProviderError> {
        self.get_envelope::<String>("fixtures/rounds", competition_id, season_year, cancel)
            .await
    }

    async fn season_fixtures(
        &self,
        competition_id: i64,
        season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fixture>, ProviderError> {
        let items = self
            .get_envelope::<FixtureItem>("fixtures", competition_id, season_year, cancel)
            .await?;
        Ok(items.into_iter().map(FixtureItem::into_fixture).collect())
    }
}

/// API-Sports reports failures in a 200 body: `errors` is `[]` when clean and
/// either a non-empty array or an object of `{field: message}` otherwise.
fn errors_message(errors: &Value) -> Option<String> {
    match errors {
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Value::Object(map) if !map.is_empty() => Some(
            map.iter()
                .map(|(k, v)| format!("{k}: {}", v.as_str().unwrap_or(&v.to_string())))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    errors: Value,
    #[serde(default = "Vec::new")]
    response: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FixtureItem {
    fixture: FixtureCore,
    league: LeagueRef,
    teams: TeamsRef,
}

#[derive(Debug, Deserialize)]
struct FixtureCore {
    id: i64,
    date: DateTime<FixedOffset>,
}

#[derive(Debug, Deserialize)]
struct LeagueRef {
    round: String,
}

#[derive(Debug, Deserialize)]
struct TeamsRef {
    home: TeamRef,
    away: TeamRef,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: i64,
}

impl FixtureItem {
    fn into_fixture(self) -> Fixture {
        Fixture {
            external_id: self.fixture.id,
            kickoff_utc: self.fixture.date.with_timezone(&Utc),
            round_label: self.league.round,
            home_team_external_id: self.teams.home.id,
            away_team_external_id: self.teams.away.id,
        }
    }
}
