//! Season synchronizer: pulls a season's feed and reconciles it into the
//! stored round/match schedule.
//!
//! Labels are walked in feed order. Each label either finds its round or
//! creates one starting at the earliest of its fixtures that no earlier
//! round's week already covers; a label with no parseable round number gets
//! nothing. Fixtures land in the label's round when they fit its window, else
//! in the most recently visited round whose window they fit. Failing both, a
//! known match joins the label's round and a new fixture waits in a deferred
//! queue for a later round to claim it. Rounds touched outside their own turn
//! are written once at the end.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use mpl_config::settings::{UnparseableLabel, MAX_DEADLINE_OFFSET_MINUTES};
use mpl_config::SyncSettings;
use mpl_fixtures::{Fixture, FixtureProvider, ProviderError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::label::parse_round_number;
use crate::pending::PendingFixtures;
use crate::schedule::{MatchSlot, RoundSlot, SeasonSchedule};
use crate::store::{RoundStore, SeasonRepository, TeamResolver};
use crate::timespan::RoundTimespanPolicy;
use crate::types::{Match, MatchStatus, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub policy: RoundTimespanPolicy,
    /// Deadline = round start minus this.
    pub deadline_offset: Duration,
    pub unparseable_label: UnparseableLabel,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: RoundTimespanPolicy::default(),
            deadline_offset: Duration::minutes(30),
            unparseable_label: UnparseableLabel::Skip,
        }
    }
}

impl SyncConfig {
    pub fn from_settings(s: &SyncSettings) -> Result<Self> {
        Ok(Self {
            policy: RoundTimespanPolicy::from_names(&s.anchor_weekday, &s.window_timezone)?,
            deadline_offset: deadline_offset(s.deadline_offset_minutes)?,
            unparseable_label: s.unparseable_label,
        })
    }
}

fn deadline_offset(minutes: i64) -> Result<Duration> {
    if !(0..=MAX_DEADLINE_OFFSET_MINUTES).contains(&minutes) {
        bail!("CONFIG_INVALID deadline offset must be within 0..={MAX_DEADLINE_OFFSET_MINUTES} minutes, got {minutes}");
    }
    Duration::try_minutes(minutes).ok_or_else(|| anyhow!("CONFIG_INVALID deadline offset {minutes} overflows"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub season_id: Uuid,
    /// False when the season has no external competition id.
    pub sync_enabled: bool,
    pub labels_seen: usize,
    pub rounds_created: usize,
    pub rounds_updated: usize,
    pub matches_created: usize,
    pub matches_moved: usize,
    pub kickoffs_updated: usize,
    /// Fixture ids skipped because a team could not be resolved.
    pub unresolved_fixtures: Vec<i64>,
    /// Labels skipped because no round number could be parsed.
    pub skipped_labels: Vec<String>,
    /// Fixture ids that no round's window accepted.
    pub unplaced_fixtures: Vec<i64>,
}

impl SyncReport {
    fn disabled(season_id: Uuid) -> Self {
        Self {
            season_id,
            ..Self::default()
        }
    }

    /// Number of store writes the run issued.
    pub fn writes(&self) -> usize {
        self.rounds_created + self.rounds_updated
    }
}

#[derive(Debug)]
pub enum SyncError {
    SeasonNotFound(Uuid),
    Cancelled,
    /// Only raised under [`UnparseableLabel::Fail`].
    UnparseableRoundLabel(String),
    Provider(ProviderError),
    Store(anyhow::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::SeasonNotFound(id) => write!(f, "season not found: {id}"),
            SyncError::Cancelled => write!(f, "sync cancelled"),
            SyncError::UnparseableRoundLabel(l) => {
                write!(f, "cannot parse round number from label '{l}'")
            }
            SyncError::Provider(e) => write!(f, "fixture provider failed: {e}"),
            SyncError::Store(e) => write!(f, "store failed: {e:#}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Provider(e) => Some(e),
            SyncError::Store(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Cancelled => SyncError::Cancelled,
            other => SyncError::Provider(other),
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

pub struct SeasonSynchronizer {
    seasons: Arc<dyn SeasonRepository>,
    rounds: Arc<dyn RoundStore>,
    teams: Arc<dyn TeamResolver>,
    provider: Arc<dyn FixtureProvider>,
    config: SyncConfig,
}

impl SeasonSynchronizer {
    pub fn new(
        seasons: Arc<dyn SeasonRepository>,
        rounds: Arc<dyn RoundStore>,
        teams: Arc<dyn TeamResolver>,
        provider: Arc<dyn FixtureProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            seasons,
            rounds,
            teams,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn seasons(&self) -> &Arc<dyn SeasonRepository> {
        &self.seasons
    }

    /// Reconcile one season against the feed. Safe to repeat: a second run
    /// over an unchanged feed issues no writes.
    pub async fn synchronize(
        &self,
        season_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        ensure_live(cancel)?;
        let season = self
            .seasons
            .get_season(season_id, cancel)
            .await
            .map_err(SyncError::Store)?
            .ok_or(SyncError::SeasonNotFound(season_id))?;

        let Some(competition_id) = season.external_competition_id else {
            info!(season_id = %season_id, "season has no external competition id; nothing to sync");
            return Ok(SyncReport::disabled(season_id));
        };

        ensure_live(cancel)?;
        let labels = self
            .provider
            .round_labels(competition_id, season.start_year, cancel)
            .await?;
        ensure_live(cancel)?;
        let fixtures = self
            .provider
            .season_fixtures(competition_id, season.start_year, cancel)
            .await?;
        ensure_live(cancel)?;
        let stored = self
            .rounds
            .get_all_rounds_for_season(season_id, cancel)
            .await
            .map_err(SyncError::Store)?;

        info!(
            season_id = %season_id,
            source = self.provider.source_name(),
            labels = labels.len(),
            fixtures = fixtures.len(),
            stored_rounds = stored.len(),
            "season sync started"
        );

        let mut by_label: HashMap<&str, Vec<&Fixture>> = HashMap::new();
        for f in &fixtures {
            by_label.entry(f.round_label.as_str()).or_default().push(f);
        }

        let mut run = SyncRun::new(self, SeasonSchedule::from_rounds(season_id, stored));
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for label in &labels {
            if !seen.insert(label.as_str()) {
                debug!(label = %label, "repeated round label ignored");
                continue;
            }
            let subset = by_label.get(label.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            run.process_label(label, subset, cancel).await?;
        }
        let orphaned = by_label.keys().filter(|l| !seen.contains(*l)).count();
        if orphaned > 0 {
            debug!(labels = orphaned, "fixtures under labels the feed did not list were ignored");
        }

        run.flush(cancel).await?;
        let report = run.finish(season_id, seen.len());
        info!(
            season_id = %season_id,
            rounds_created = report.rounds_created,
            rounds_updated = report.rounds_updated,
            matches_created = report.matches_created,
            matches_moved = report.matches_moved,
            kickoffs_updated = report.kickoffs_updated,
            unplaced = report.unplaced_fixtures.len(),
            "season sync finished"
        );
        Ok(report)
    }
}

enum Opening {
    Opened(RoundSlot),
    /// Every fixture fits a round already visited in this run.
    Absorbed,
    Skipped,
}

/// Mutable state of a single `synchronize` call.
struct SyncRun<'a> {
    sync: &'a SeasonSynchronizer,
    schedule: SeasonSchedule,
    pending: PendingFixtures,
    /// Rounds already processed, in visit order.
    visited: Vec<RoundSlot>,
    /// Rounds with changes not yet written.
    dirty: BTreeSet<RoundSlot>,
    team_cache: HashMap<i64, Option<Team>>,
    unresolved: BTreeSet<i64>,
    report: SyncReport,
}

impl<'a> SyncRun<'a> {
    fn new(sync: &'a SeasonSynchronizer, schedule: SeasonSchedule) -> Self {
        Self {
            sync,
            schedule,
            pending: PendingFixtures::new(),
            visited: Vec::new(),
            dirty: BTreeSet::new(),
            team_cache: HashMap::new(),
            unresolved: BTreeSet::new(),
            report: SyncReport::default(),
        }
    }

    fn fits(&self, kickoff: DateTime<Utc>, slot: RoundSlot) -> bool {
        self.sync
            .config
            .policy
            .belongs_to_round_window(kickoff, self.schedule.round_start(slot))
    }

    /// Most recently visited round whose window contains `kickoff`.
    fn visited_round_for(&self, kickoff: DateTime<Utc>) -> Option<RoundSlot> {
        self.visited
            .iter()
            .rev()
            .copied()
            .find(|&slot| self.fits(kickoff, slot))
    }

    async fn process_label(
        &mut self,
        label: &str,
        subset: &[&Fixture],
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let round = match self.schedule.round_for_label(label) {
            Some(slot) => slot,
            None => match self.open_round(label, subset)? {
                Opening::Opened(slot) => slot,
                Opening::Skipped => return Ok(()),
                Opening::Absorbed => {
                    for f in subset {
                        self.place(None, f, cancel).await?;
                    }
                    return Ok(());
                }
            },
        };

        let start = self.schedule.round_start(round);
        let policy = self.sync.config.policy;
        let claimed = self
            .pending
            .claim(|f| policy.belongs_to_round_window(f.kickoff_utc, start));
        for f in claimed {
            if !self.place_into(round, &f, cancel).await? {
                self.pending.push(f);
            }
        }

        for f in subset {
            self.place(Some(round), f, cancel).await?;
        }
        self.visited.push(round);

        if self
            .schedule
            .realign_start(round, self.sync.config.deadline_offset)
        {
            self.dirty.insert(round);
        }
        if self.dirty.contains(&round) || !self.schedule.is_persisted(round) {
            self.persist(round, cancel).await?;
        }
        Ok(())
    }

    /// Decide what a label without a stored round gets: a new round, nothing
    /// because its fixtures all sit in visited weeks, or nothing at all.
    fn open_round(&mut self, label: &str, subset: &[&Fixture]) -> Result<Opening, SyncError> {
        if subset.is_empty() {
            debug!(label = %label, "no fixtures for unknown label; no round created");
            return Ok(Opening::Skipped);
        }
        let Some(round_number) = parse_round_number(label) else {
            return match self.sync.config.unparseable_label {
                UnparseableLabel::Skip => {
                    warn!(label = %label, fixtures = subset.len(), "cannot parse round number; label skipped");
                    self.report.skipped_labels.push(label.to_string());
                    Ok(Opening::Skipped)
                }
                UnparseableLabel::Fail => Err(SyncError::UnparseableRoundLabel(label.to_string())),
            };
        };

        let earliest = subset
            .iter()
            .map(|f| f.kickoff_utc)
            .filter(|&k| self.visited_round_for(k).is_none())
            .min();
        let Some(start) = earliest else {
            return Ok(Opening::Absorbed);
        };

        let slot = self.schedule.add_round(
            round_number,
            start,
            start - self.sync.config.deadline_offset,
            label,
        );
        info!(label = %label, round_number, start_utc = %start, "round created");
        Ok(Opening::Opened(slot))
    }

    /// Place a fixture of the label being processed. `round` is that label's
    /// round, if it has one.
    async fn place(
        &mut self,
        round: Option<RoundSlot>,
        f: &Fixture,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let target = round
            .filter(|&r| self.fits(f.kickoff_utc, r))
            .or_else(|| self.visited_round_for(f.kickoff_utc));

        match (self.schedule.find_by_external_id(f.external_id), target) {
            (Some(m), Some(dest)) => self.relocate(m, dest, f.kickoff_utc),
            (Some(m), None) => {
                let owner = self.schedule.owner(m);
                let dest = match round {
                    // Claimed earlier from the deferred queue by a later week.
                    Some(r) if owner != r && self.fits(f.kickoff_utc, owner) => owner,
                    Some(r) => r,
                    None => owner,
                };
                self.relocate(m, dest, f.kickoff_utc);
            }
            (None, Some(dest)) => {
                self.create_match(dest, f, cancel).await?;
            }
            (None, None) => self.pending.push(f.clone()),
        }
        Ok(())
    }

    /// Place a claimed deferred fixture into `round`. Returns `false` when it
    /// could not be placed and should stay deferred.
    async fn place_into(
        &mut self,
        round: RoundSlot,
        f: &Fixture,
        cancel: &CancellationToken,
    ) -> Result<bool, SyncError> {
        match self.schedule.find_by_external_id(f.external_id) {
            Some(m) => {
                self.relocate(m, round, f.kickoff_utc);
                Ok(true)
            }
            None => self.create_match(round, f, cancel).await,
        }
    }

    fn relocate(&mut self, m: MatchSlot, dest: RoundSlot, kickoff: DateTime<Utc>) {
        let owner = self.schedule.owner(m);
        let kickoff_changed = self.schedule.set_kickoff(m, kickoff);
        if kickoff_changed {
            self.report.kickoffs_updated += 1;
        }
        if owner != dest {
            self.schedule.move_match(m, dest);
            self.dirty.insert(owner);
            self.dirty.insert(dest);
            self.report.matches_moved += 1;
            debug!(
                external_id = ?self.schedule.match_record(m).external_id,
                from_round = self.schedule.round_number(owner),
                to_round = self.schedule.round_number(dest),
                "match moved"
            );
        } else if kickoff_changed {
            self.dirty.insert(owner);
        }
    }

    async fn resolve_team(
        &mut self,
        external_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Option<Team>, SyncError> {
        if let Some(hit) = self.team_cache.get(&external_id) {
            return Ok(hit.clone());
        }
        ensure_live(cancel)?;
        let team = self
            .sync
            .teams
            .get_by_external_id(external_id, cancel)
            .await
            .map_err(SyncError::Store)?;
        self.team_cache.insert(external_id, team.clone());
        Ok(team)
    }

    async fn create_match(
        &mut self,
        round: RoundSlot,
        f: &Fixture,
        cancel: &CancellationToken,
    ) -> Result<bool, SyncError> {
        let home = self.resolve_team(f.home_team_external_id, cancel).await?;
        let away = self.resolve_team(f.away_team_external_id, cancel).await?;
        let (Some(home), Some(away)) = (home, away) else {
            if self.unresolved.insert(f.external_id) {
                warn!(
                    external_id = f.external_id,
                    home = f.home_team_external_id,
                    away = f.away_team_external_id,
                    "team not found; fixture skipped"
                );
            }
            return Ok(false);
        };

        self.schedule.add_match(
            round,
            Match {
                match_id: Uuid::new_v4(),
                external_id: Some(f.external_id),
                kickoff_utc: f.kickoff_utc,
                home_team_id: home.team_id,
                away_team_id: away.team_id,
                status: MatchStatus::Scheduled,
            },
        );
        self.dirty.insert(round);
        self.report.matches_created += 1;
        Ok(true)
    }

    async fn persist(&mut self, slot: RoundSlot, cancel: &CancellationToken) -> Result<(), SyncError> {
        ensure_live(cancel)?;
        match self.schedule.to_round(slot) {
            Some(round) => {
                self.sync
                    .rounds
                    .update_round(&round, cancel)
                    .await
                    .map_err(SyncError::Store)?;
                self.report.rounds_updated += 1;
                debug!(round_id = %round.round_id, round_number = round.round_number, "round updated");
            }
            None => {
                let created = self
                    .sync
                    .rounds
                    .create_round(self.schedule.to_new_round(slot), cancel)
                    .await
                    .map_err(SyncError::Store)?;
                self.schedule.mark_created(slot, created.round_id);
                self.report.rounds_created += 1;
            }
        }
        self.dirty.remove(&slot);
        Ok(())
    }

    /// Settle deferred fixtures and write every round still dirty.
    async fn flush(&mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let leftovers = std::mem::take(&mut self.pending).into_inner();
        for f in leftovers {
            // Repeated feed rows for an id that was placed elsewhere.
            if self.schedule.find_by_external_id(f.external_id).is_some()
                || self.unresolved.contains(&f.external_id)
            {
                continue;
            }
            warn!(
                external_id = f.external_id,
                label = %f.round_label,
                kickoff_utc = %f.kickoff_utc,
                "fixture fits no round window; left unplaced"
            );
            self.report.unplaced_fixtures.push(f.external_id);
        }

        let dirty: Vec<RoundSlot> = self.dirty.iter().copied().collect();
        for slot in dirty {
            self.schedule
                .realign_start(slot, self.sync.config.deadline_offset);
            self.persist(slot, cancel).await?;
        }
        Ok(())
    }

    fn finish(self, season_id: Uuid, labels_seen: usize) -> SyncReport {
        SyncReport {
            season_id,
            sync_enabled: true,
            labels_seen,
            unresolved_fixtures: self.unresolved.into_iter().collect(),
            ..self.report
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_cancellation_maps_to_cancelled() {
        assert!(matches!(
            SyncError::from(ProviderError::Cancelled),
            SyncError::Cancelled
        ));
        assert!(matches!(
            SyncError::from(ProviderError::Transport("reset".into())),
            SyncError::Provider(ProviderError::Transport(_))
        ));
    }

    #[test]
    fn sync_error_display_names_the_cause() {
        let id = Uuid::nil();
        assert_eq!(
            SyncError::SeasonNotFound(id).to_string(),
            format!("season not found: {id}")
        );
        let e = SyncError::Store(anyhow::anyhow!("pool timed out"));
        assert!(e.to_string().contains("pool timed out"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn config_from_settings_uses_configured_week() {
        let mut s = SyncSettings::default();
        s.anchor_weekday = "monday".to_string();
        s.deadline_offset_minutes = 90;
        s.unparseable_label = UnparseableLabel::Fail;
        let c = SyncConfig::from_settings(&s).unwrap();
        assert_eq!(c.policy.anchor(), chrono::Weekday::Mon);
        assert_eq!(c.deadline_offset, Duration::minutes(90));
        assert_eq!(c.unparseable_label, UnparseableLabel::Fail);

        s.window_timezone = "Nowhere/Special".to_string();
        assert!(SyncConfig::from_settings(&s).is_err());
    }

    #[test]
    fn out_of_range_deadline_offset_is_an_error_not_a_panic() {
        let mut s = SyncSettings::default();
        s.deadline_offset_minutes = i64::MAX;
        let err = SyncConfig::from_settings(&s).unwrap_err();
        assert!(err.to_string().contains("CONFIG_INVALID"));

        s.deadline_offset_minutes = -1;
        assert!(SyncConfig::from_settings(&s).is_err());
    }

    #[test]
    fn default_config_is_wednesday_utc_thirty_minutes() {
        let c = SyncConfig::default();
        assert_eq!(c, SyncConfig::from_settings(&SyncSettings::default()).unwrap());
    }

    #[test]
    fn report_writes_counts_round_writes() {
        let r = SyncReport {
            rounds_created: 2,
            rounds_updated: 3,
            matches_created: 20,
            ..SyncReport::default()
        };
        assert_eq!(r.writes(), 5);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["rounds_created"], 2);
    }
}
