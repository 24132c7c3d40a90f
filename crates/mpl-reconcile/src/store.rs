//! Persistence seams the synchronizer drives.
//!
//! All methods take the run's cancellation token so implementations can
//! abandon long queries; failures surface as `anyhow::Error` and abort the
//! season's sync.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{NewRound, Round, Season, Team};

#[async_trait]
pub trait SeasonRepository: Send + Sync {
    async fn get_season(&self, season_id: Uuid, cancel: &CancellationToken)
        -> Result<Option<Season>>;

    /// Seasons that carry an external competition id.
    async fn list_sync_enabled_seasons(&self, cancel: &CancellationToken) -> Result<Vec<Season>>;
}

#[async_trait]
pub trait TeamResolver: Send + Sync {
    /// `Ok(None)` is a miss, not an error.
    async fn get_by_external_id(
        &self,
        external_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Option<Team>>;
}

#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Every round of the season with its matches, keyed by round id.
    async fn get_all_rounds_for_season(
        &self,
        season_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<Uuid, Round>>;

    /// Insert the round and its matches; returns it with the assigned id.
    async fn create_round(&self, round: NewRound, cancel: &CancellationToken) -> Result<Round>;

    /// Write the round header and upsert its matches by `match_id`, re-pointing
    /// any that previously belonged to another round. Matches are never
    /// deleted.
    async fn update_round(&self, round: &Round, cancel: &CancellationToken) -> Result<()>;
}
