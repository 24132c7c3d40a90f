//! `Mutex`-backed store implementing every persistence trait the
//! synchronizer uses. Rounds and matches are kept in separate tables with a
//! round foreign key on each match, mirroring the Postgres layout, and the
//! same uniqueness rules are enforced on write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mpl_reconcile::{
    Match, NewRound, Round, RoundStatus, RoundStore, Season, SeasonRepository, Team, TeamResolver,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounters {
    pub rounds_created: usize,
    pub rounds_updated: usize,
}

impl WriteCounters {
    pub fn total(&self) -> usize {
        self.rounds_created + self.rounds_updated
    }
}

#[derive(Debug, Clone)]
struct RoundRow {
    season_id: Uuid,
    round_number: i32,
    start_utc: DateTime<Utc>,
    deadline_utc: DateTime<Utc>,
    status: RoundStatus,
    external_label: Option<String>,
}

#[derive(Debug, Clone)]
struct MatchRow {
    round_id: Uuid,
    season_id: Uuid,
    record: Match,
}

#[derive(Default)]
struct Inner {
    seasons: BTreeMap<Uuid, Season>,
    teams: HashMap<i64, Team>,
    rounds: BTreeMap<Uuid, RoundRow>,
    matches: BTreeMap<Uuid, MatchRow>,
    counters: WriteCounters,
    updates_by_round: HashMap<Uuid, usize>,
    fail_writes: Option<String>,
}

impl Inner {
    fn assemble(&self, round_id: Uuid, row: &RoundRow) -> Round {
        let mut matches: Vec<Match> = self
            .matches
            .values()
            .filter(|m| m.round_id == round_id)
            .map(|m| m.record.clone())
            .collect();
        matches.sort_by_key(|m| (m.kickoff_utc, m.external_id));
        Round {
            round_id,
            season_id: row.season_id,
            round_number: row.round_number,
            start_utc: row.start_utc,
            deadline_utc: row.deadline_utc,
            status: row.status,
            external_label: row.external_label.clone(),
            matches,
        }
    }

    fn check_label(&self, round_id: Uuid, season_id: Uuid, label: Option<&str>) -> Result<()> {
        let Some(label) = label else { return Ok(()) };
        let clash = self.rounds.iter().any(|(id, r)| {
            *id != round_id && r.season_id == season_id && r.external_label.as_deref() == Some(label)
        });
        if clash {
            bail!("unique violation: round label '{label}' already exists in season {season_id}");
        }
        Ok(())
    }

    fn upsert_matches(&mut self, round_id: Uuid, season_id: Uuid, matches: &[Match]) -> Result<()> {
        for m in matches {
            if let Some(ext) = m.external_id {
                let clash = self.matches.iter().any(|(id, row)| {
                    *id != m.match_id && row.season_id == season_id && row.record.external_id == Some(ext)
                });
                if clash {
                    bail!("unique violation: external match id {ext} already exists in season {season_id}");
                }
            }
        }
        for m in matches {
            self.matches.insert(
                m.match_id,
                MatchRow {
                    round_id,
                    season_id,
                    record: m.clone(),
                },
            );
        }
        Ok(())
    }

    fn injected_failure(&self) -> Result<()> {
        match &self.fail_writes {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemorySeasonStore {
    inner: Mutex<Inner>,
}

impl InMemorySeasonStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_season(&self, season: Season) {
        self.lock().seasons.insert(season.season_id, season);
    }

    /// Register a team under its feed id and return it.
    pub fn add_team(&self, external_id: i64, name: &str) -> Team {
        let team = Team {
            team_id: Uuid::new_v4(),
            external_id,
            name: name.to_string(),
        };
        self.lock().teams.insert(external_id, team.clone());
        team
    }

    /// Seed a round directly, bypassing the counters.
    pub fn insert_round(&self, round: Round) -> Result<()> {
        let mut inner = self.lock();
        inner.check_label(round.round_id, round.season_id, round.external_label.as_deref())?;
        inner.upsert_matches(round.round_id, round.season_id, &round.matches)?;
        inner.rounds.insert(
            round.round_id,
            RoundRow {
                season_id: round.season_id,
                round_number: round.round_number,
                start_utc: round.start_utc,
                deadline_utc: round.deadline_utc,
                status: round.status,
                external_label: round.external_label,
            },
        );
        Ok(())
    }

    /// Rounds of the season ordered by round number then start.
    pub fn rounds(&self, season_id: Uuid) -> Vec<Round> {
        let inner = self.lock();
        let mut out: Vec<Round> = inner
            .rounds
            .iter()
            .filter(|(_, r)| r.season_id == season_id)
            .map(|(id, r)| inner.assemble(*id, r))
            .collect();
        out.sort_by_key(|r| (r.round_number, r.start_utc));
        out
    }

    pub fn round_by_label(&self, season_id: Uuid, label: &str) -> Option<Round> {
        self.rounds(season_id)
            .into_iter()
            .find(|r| r.external_label.as_deref() == Some(label))
    }

    /// Round number owning the match with this feed id.
    pub fn owner_of(&self, season_id: Uuid, external_id: i64) -> Option<i32> {
        self.rounds(season_id)
            .into_iter()
            .find(|r| r.matches.iter().any(|m| m.external_id == Some(external_id)))
            .map(|r| r.round_number)
    }

    pub fn counters(&self) -> WriteCounters {
        self.lock().counters
    }

    /// `update_round` calls for one round since the last reset.
    pub fn updates_of(&self, round_id: Uuid) -> usize {
        self.lock().updates_by_round.get(&round_id).copied().unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        let mut inner = self.lock();
        inner.counters = WriteCounters::default();
        inner.updates_by_round.clear();
    }

    /// Make every subsequent write fail with `msg`; `None` clears it.
    pub fn fail_writes(&self, msg: Option<&str>) {
        self.lock().fail_writes = msg.map(str::to_string);
    }
}

#[async_trait]
impl SeasonRepository for InMemorySeasonStore {
    async fn get_season(&self, season_id: Uuid, _cancel: &CancellationToken) -> Result<Option<Season>> {
        Ok(self.lock().seasons.get(&season_id).cloned())
    }

    async fn list_sync_enabled_seasons(&self, _cancel: &CancellationToken) -> Result<Vec<Season>> {
        Ok(self
            .lock()
            .seasons
            .values()
            .filter(|s| s.sync_enabled())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TeamResolver for InMemorySeasonStore {
    async fn get_by_external_id(&self, external_id: i64, _cancel: &CancellationToken) -> Result<Option<Team>> {
        Ok(self.lock().teams.get(&external_id).cloned())
    }
}

#[async_trait]
impl RoundStore for InMemorySeasonStore {
    async fn get_all_rounds_for_season(
        &self,
        season_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<BTreeMap<Uuid, Round>> {
        Ok(self
            .rounds(season_id)
            .into_iter()
            .map(|r| (r.round_id, r))
            .collect())
    }

    async fn create_round(&self, round: NewRound, _cancel: &CancellationToken) -> Result<Round> {
        let mut inner = self.lock();
        inner.injected_failure()?;
        let round_id = Uuid::new_v4();
        inner.check_label(round_id, round.season_id, round.external_label.as_deref())?;
        inner.upsert_matches(round_id, round.season_id, &round.matches)?;
        inner.rounds.insert(
            round_id,
            RoundRow {
                season_id: round.season_id,
                round_number: round.round_number,
                start_utc: round.start_utc,
                deadline_utc: round.deadline_utc,
                status: round.status,
                external_label: round.external_label.clone(),
            },
        );
        inner.counters.rounds_created += 1;
        Ok(round.into_round(round_id))
    }

    async fn update_round(&self, round: &Round, _cancel: &CancellationToken) -> Result<()> {
        let mut inner = self.lock();
        inner.injected_failure()?;
        if !inner.rounds.contains_key(&round.round_id) {
            bail!("round not found: {}", round.round_id);
        }
        inner.check_label(round.round_id, round.season_id, round.external_label.as_deref())?;
        inner.upsert_matches(round.round_id, round.season_id, &round.matches)?;
        if let Some(row) = inner.rounds.get_mut(&round.round_id) {
            row.round_number = round.round_number;
            row.start_utc = round.start_utc;
            row.deadline_utc = round.deadline_utc;
            row.status = round.status;
            row.external_label = round.external_label.clone();
        }
        inner.counters.rounds_updated += 1;
        *inner.updates_by_round.entry(round.round_id).or_default() += 1;
        Ok(())
    }
}
