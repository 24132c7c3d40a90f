use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A competition season. Without an external competition id the season is
/// not linked to any feed and sync is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub season_id: Uuid,
    pub name: String,
    pub external_competition_id: Option<i64>,
    /// Year the feed files this season under (e.g. 2024 for 2024/25).
    pub start_year: i32,
}

impl Season {
    pub fn sync_enabled(&self) -> bool {
        self.external_competition_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: Uuid,
    pub external_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundStatus {
    Planned,
    Open,
    Closed,
    Finished,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Planned => "PLANNED",
            RoundStatus::Open => "OPEN",
            RoundStatus::Closed => "CLOSED",
            RoundStatus::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PLANNED" => Ok(RoundStatus::Planned),
            "OPEN" => Ok(RoundStatus::Open),
            "CLOSED" => Ok(RoundStatus::Closed),
            "FINISHED" => Ok(RoundStatus::Finished),
            other => Err(anyhow!("invalid round status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Live => "LIVE",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Postponed => "POSTPONED",
            MatchStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "SCHEDULED" => Ok(MatchStatus::Scheduled),
            "LIVE" => Ok(MatchStatus::Live),
            "FINISHED" => Ok(MatchStatus::Finished),
            "POSTPONED" => Ok(MatchStatus::Postponed),
            "CANCELLED" => Ok(MatchStatus::Cancelled),
            other => Err(anyhow!("invalid match status: {}", other)),
        }
    }
}

/// A single fixture between two teams. Which round owns it is expressed by
/// the containing [`Round`], not by a field on the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: Uuid,
    /// Feed id; `None` for matches entered by hand.
    pub external_id: Option<i64>,
    pub kickoff_utc: DateTime<Utc>,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: Uuid,
    pub season_id: Uuid,
    pub round_number: i32,
    /// Equals the earliest kickoff among `matches` whenever it is non-empty.
    pub start_utc: DateTime<Utc>,
    pub deadline_utc: DateTime<Utc>,
    pub status: RoundStatus,
    /// Feed's name for this round; unique within the season once set.
    pub external_label: Option<String>,
    pub matches: Vec<Match>,
}

impl Round {
    pub fn earliest_kickoff(&self) -> Option<DateTime<Utc>> {
        self.matches.iter().map(|m| m.kickoff_utc).min()
    }
}

/// A round not yet persisted; the store assigns `round_id` on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRound {
    pub season_id: Uuid,
    pub round_number: i32,
    pub start_utc: DateTime<Utc>,
    pub deadline_utc: DateTime<Utc>,
    pub status: RoundStatus,
    pub external_label: Option<String>,
    pub matches: Vec<Match>,
}

impl NewRound {
    pub fn into_round(self, round_id: Uuid) -> Round {
        Round {
            round_id,
            season_id: self.season_id,
            round_number: self.round_number,
            start_utc: self.start_utc,
            deadline_utc: self.deadline_utc,
            status: self.status,
            external_label: self.external_label,
            matches: self.matches,
        }
    }
}
