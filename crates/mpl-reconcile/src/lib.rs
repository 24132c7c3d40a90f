//! mpl-reconcile
//!
//! Fixture reconciliation for one season: turns the feed's labelled fixtures
//! into rounds whose matches all fall in one anchored calendar week.
//!
//! The engine only talks to collaborators through the traits in [`store`]
//! and [`mpl_fixtures::FixtureProvider`]; persistence lives in `mpl-db` and
//! in-memory doubles in `mpl-testkit`.

mod engine;
mod label;
mod pending;
mod schedule;
pub mod store;
mod timespan;
mod types;

pub use engine::{SeasonSynchronizer, SyncConfig, SyncError, SyncReport};
pub use label::{parse_round_number, LABEL_SEPARATOR};
pub use mpl_config::settings::UnparseableLabel;
pub use pending::PendingFixtures;
pub use schedule::{MatchSlot, RoundSlot, SeasonSchedule};
pub use store::{RoundStore, SeasonRepository, TeamResolver};
pub use timespan::{RoundTimespanPolicy, RoundWindow, WINDOW_DAYS};
pub use types::*;
