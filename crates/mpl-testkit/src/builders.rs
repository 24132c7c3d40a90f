use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mpl_fixtures::Fixture;
use mpl_reconcile::{Round, Season, SeasonSynchronizer, SyncConfig};
use uuid::Uuid;

use crate::{InMemorySeasonStore, ScriptedFixtureProvider};

/// UTC instant; panics on an impossible date.
pub fn kickoff(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap_or_else(|| panic!("invalid kickoff {year}-{month}-{day} {hour}:{minute}"));
    Utc.from_utc_datetime(&naive)
}

pub fn fixture(external_id: i64, label: &str, kickoff_utc: DateTime<Utc>, home: i64, away: i64) -> Fixture {
    Fixture {
        external_id,
        kickoff_utc,
        round_label: label.to_string(),
        home_team_external_id: home,
        away_team_external_id: away,
    }
}

pub fn season(external_competition_id: Option<i64>) -> Season {
    Season {
        season_id: Uuid::new_v4(),
        name: "Premier League 2024/25".to_string(),
        external_competition_id,
        start_year: 2024,
    }
}

/// One linked season with teams `1..=teams` registered, an empty feed and a
/// shared in-memory store.
pub struct SeasonWorld {
    pub store: Arc<InMemorySeasonStore>,
    pub feed: Arc<ScriptedFixtureProvider>,
    pub season: Season,
}

impl SeasonWorld {
    pub fn new(teams: i64) -> Self {
        let store = Arc::new(InMemorySeasonStore::new());
        let season = season(Some(39));
        store.add_season(season.clone());
        for id in 1..=teams {
            store.add_team(id, &format!("Team {id}"));
        }
        Self {
            store,
            feed: Arc::new(ScriptedFixtureProvider::default()),
            season,
        }
    }

    pub fn season_id(&self) -> Uuid {
        self.season.season_id
    }

    pub fn synchronizer(&self, config: SyncConfig) -> SeasonSynchronizer {
        SeasonSynchronizer::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.feed.clone(),
            config,
        )
    }

    pub fn rounds(&self) -> Vec<Round> {
        self.store.rounds(self.season.season_id)
    }
}
