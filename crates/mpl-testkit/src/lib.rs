//! In-memory collaborators and builders for exercising the synchronizer
//! without Postgres or the network.

mod builders;
mod memory_store;
mod scripted_feed;

pub use builders::{fixture, kickoff, season, SeasonWorld};
pub use memory_store::{InMemorySeasonStore, WriteCounters};
pub use scripted_feed::ScriptedFixtureProvider;

use mpl_reconcile::{Round, RoundTimespanPolicy};

/// Panics when stored rounds break label or external-id uniqueness, or a
/// non-empty round's start differs from its earliest kickoff.
pub fn assert_schedule_consistent(rounds: &[Round]) {
    let mut labels = std::collections::BTreeSet::new();
    let mut ext_ids = std::collections::BTreeSet::new();
    for r in rounds {
        if let Some(l) = &r.external_label {
            assert!(labels.insert(l.clone()), "duplicate round label {l}");
        }
        for m in &r.matches {
            if let Some(e) = m.external_id {
                assert!(ext_ids.insert(e), "external id {e} owned by two rounds");
            }
        }
        if let Some(earliest) = r.earliest_kickoff() {
            assert_eq!(
                r.start_utc, earliest,
                "round {} start is not its earliest kickoff",
                r.round_number
            );
        }
    }
}

/// Panics when a match kicks off outside its round's window.
pub fn assert_windows_hold(rounds: &[Round], policy: &RoundTimespanPolicy) {
    for r in rounds {
        for m in &r.matches {
            assert!(
                policy.belongs_to_round_window(m.kickoff_utc, r.start_utc),
                "match {:?} at {} outside round {} window",
                m.external_id,
                m.kickoff_utc,
                r.round_number
            );
        }
    }
}
