//! In-memory working set for one season's reconciliation run.
//!
//! Rounds and matches live in flat arenas addressed by [`RoundSlot`] and
//! [`MatchSlot`]. Each match records the slot of its single owning round, so
//! a match can never belong to two rounds at once, and `by_external_id`
//! guarantees one match per feed fixture id.
//!
//! Rounds created during a run have no `round_id` until the store hands one
//! back; see [`SeasonSchedule::mark_created`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::types::{Match, NewRound, Round, RoundStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundSlot(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchSlot(usize);

#[derive(Debug, Clone)]
struct RoundEntry {
    round_id: Option<Uuid>,
    round_number: i32,
    start_utc: DateTime<Utc>,
    deadline_utc: DateTime<Utc>,
    status: RoundStatus,
    external_label: Option<String>,
}

#[derive(Debug, Clone)]
struct MatchEntry {
    record: Match,
    owner: RoundSlot,
}

#[derive(Debug, Clone)]
pub struct SeasonSchedule {
    season_id: Uuid,
    rounds: Vec<RoundEntry>,
    matches: Vec<MatchEntry>,
    by_external_id: HashMap<i64, MatchSlot>,
    by_label: HashMap<String, RoundSlot>,
}

impl SeasonSchedule {
    pub fn new(season_id: Uuid) -> Self {
        Self {
            season_id,
            rounds: Vec::new(),
            matches: Vec::new(),
            by_external_id: HashMap::new(),
            by_label: HashMap::new(),
        }
    }

    /// Load stored rounds. Rounds are slotted by `(round_number, start_utc)`.
    /// Stored data that already breaks label or external-id uniqueness keeps
    /// the first occurrence in the index and logs the rest.
    pub fn from_rounds(season_id: Uuid, stored: BTreeMap<Uuid, Round>) -> Self {
        let mut rounds: Vec<Round> = stored.into_values().collect();
        rounds.sort_by(|a, b| {
            (a.round_number, a.start_utc, a.round_id).cmp(&(b.round_number, b.start_utc, b.round_id))
        });

        let mut schedule = Self::new(season_id);
        for round in rounds {
            let slot = RoundSlot(schedule.rounds.len());
            if let Some(label) = &round.external_label {
                if schedule.by_label.contains_key(label) {
                    warn!(round_id = %round.round_id, label = %label, "duplicate round label in store; ignoring for lookup");
                } else {
                    schedule.by_label.insert(label.clone(), slot);
                }
            }
            schedule.rounds.push(RoundEntry {
                round_id: Some(round.round_id),
                round_number: round.round_number,
                start_utc: round.start_utc,
                deadline_utc: round.deadline_utc,
                status: round.status,
                external_label: round.external_label,
            });
            for m in round.matches {
                let mslot = MatchSlot(schedule.matches.len());
                if let Some(ext) = m.external_id {
                    if schedule.by_external_id.contains_key(&ext) {
                        warn!(external_id = ext, match_id = %m.match_id, "duplicate external match id in store; ignoring for lookup");
                    } else {
                        schedule.by_external_id.insert(ext, mslot);
                    }
                }
                schedule.matches.push(MatchEntry {
                    record: m,
                    owner: slot,
                });
            }
        }
        schedule
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn round_for_label(&self, label: &str) -> Option<RoundSlot> {
        self.by_label.get(label).copied()
    }

    /// New, unpersisted round labelled `label`.
    pub fn add_round(
        &mut self,
        round_number: i32,
        start_utc: DateTime<Utc>,
        deadline_utc: DateTime<Utc>,
        label: &str,
    ) -> RoundSlot {
        let slot = RoundSlot(self.rounds.len());
        self.rounds.push(RoundEntry {
            round_id: None,
            round_number,
            start_utc,
            deadline_utc,
            status: RoundStatus::Planned,
            external_label: Some(label.to_string()),
        });
        self.by_label.insert(label.to_string(), slot);
        slot
    }

    pub fn round_id(&self, slot: RoundSlot) -> Option<Uuid> {
        self.rounds[slot.0].round_id
    }

    pub fn is_persisted(&self, slot: RoundSlot) -> bool {
        self.rounds[slot.0].round_id.is_some()
    }

    pub fn round_number(&self, slot: RoundSlot) -> i32 {
        self.rounds[slot.0].round_number
    }

    pub fn round_start(&self, slot: RoundSlot) -> DateTime<Utc> {
        self.rounds[slot.0].start_utc
    }

    pub fn find_by_external_id(&self, external_id: i64) -> Option<MatchSlot> {
        self.by_external_id.get(&external_id).copied()
    }

    pub fn owner(&self, slot: MatchSlot) -> RoundSlot {
        self.matches[slot.0].owner
    }

    pub fn match_record(&self, slot: MatchSlot) -> &Match {
        &self.matches[slot.0].record
    }

    /// Attach a new match to `owner`. A record whose external id is already
    /// indexed is not inserted; the existing slot is returned instead.
    pub fn add_match(&mut self, owner: RoundSlot, record: Match) -> MatchSlot {
        if let Some(existing) = record.external_id.and_then(|e| self.find_by_external_id(e)) {
            return existing;
        }
        let slot = MatchSlot(self.matches.len());
        if let Some(ext) = record.external_id {
            self.by_external_id.insert(ext, slot);
        }
        self.matches.push(MatchEntry { record, owner });
        slot
    }

    /// Re-home a match. Returns the previous owner.
    pub fn move_match(&mut self, slot: MatchSlot, to: RoundSlot) -> RoundSlot {
        std::mem::replace(&mut self.matches[slot.0].owner, to)
    }

    /// Returns whether the kickoff actually changed.
    pub fn set_kickoff(&mut self, slot: MatchSlot, kickoff: DateTime<Utc>) -> bool {
        let m = &mut self.matches[slot.0].record;
        if m.kickoff_utc == kickoff {
            return false;
        }
        m.kickoff_utc = kickoff;
        true
    }

    pub fn matches_of(&self, slot: RoundSlot) -> impl Iterator<Item = &Match> + '_ {
        self.matches
            .iter()
            .filter(move |e| e.owner == slot)
            .map(|e| &e.record)
    }

    pub fn earliest_kickoff(&self, slot: RoundSlot) -> Option<DateTime<Utc>> {
        self.matches_of(slot).map(|m| m.kickoff_utc).min()
    }

    /// Move the round start to its earliest kickoff (deadline follows at
    /// `deadline_offset` before it). Rounds without matches keep their
    /// start. Returns whether anything changed.
    pub fn realign_start(&mut self, slot: RoundSlot, deadline_offset: Duration) -> bool {
        let Some(earliest) = self.earliest_kickoff(slot) else {
            return false;
        };
        let entry = &mut self.rounds[slot.0];
        let deadline = earliest - deadline_offset;
        if entry.start_utc == earliest && entry.deadline_utc == deadline {
            return false;
        }
        entry.start_utc = earliest;
        entry.deadline_utc = deadline;
        true
    }

    fn sorted_matches(&self, slot: RoundSlot) -> Vec<Match> {
        let mut out: Vec<Match> = self.matches_of(slot).cloned().collect();
        out.sort_by(|a, b| {
            (a.kickoff_utc, a.external_id, a.match_id).cmp(&(b.kickoff_utc, b.external_id, b.match_id))
        });
        out
    }

    pub fn to_new_round(&self, slot: RoundSlot) -> NewRound {
        let e = &self.rounds[slot.0];
        NewRound {
            season_id: self.season_id,
            round_number: e.round_number,
            start_utc: e.start_utc,
            deadline_utc: e.deadline_utc,
            status: e.status,
            external_label: e.external_label.clone(),
            matches: self.sorted_matches(slot),
        }
    }

    /// `None` until the round has been persisted.
    pub fn to_round(&self, slot: RoundSlot) -> Option<Round> {
        let round_id = self.round_id(slot)?;
        Some(self.to_new_round(slot).into_round(round_id))
    }

    pub fn mark_created(&mut self, slot: RoundSlot, round_id: Uuid) {
        self.rounds[slot.0].round_id = Some(round_id);
    }
}
