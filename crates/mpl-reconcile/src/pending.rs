//! Deferred queue of fixtures that no round visited so far could take.
//!
//! Items are carried forward label by label; each round offers to claim the
//! ones whose kickoff fits its window. Order of the remaining items is kept.

use std::collections::VecDeque;

use mpl_fixtures::Fixture;

#[derive(Debug, Default, Clone)]
pub struct PendingFixtures {
    items: VecDeque<Fixture>,
}

impl PendingFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fixture: Fixture) {
        self.items.push_back(fixture);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.items.iter()
    }

    /// Remove and return every item `accept` says yes to, in queue order.
    pub fn claim<F>(&mut self, mut accept: F) -> Vec<Fixture>
    where
        F: FnMut(&Fixture) -> bool,
    {
        let mut claimed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.items.len());
        for f in self.items.drain(..) {
            if accept(&f) {
                claimed.push(f);
            } else {
                kept.push_back(f);
            }
        }
        self.items = kept;
        claimed
    }

    pub fn into_inner(self) -> Vec<Fixture> {
        self.items.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Utc};

    fn fx(id: i64, day: u32) -> Fixture {
        Fixture {
            external_id: id,
            kickoff_utc: Utc.with_ymd_and_hms(2024, 9, day, 15, 0, 0).unwrap(),
            round_label: "League - 1".to_string(),
            home_team_external_id: 1,
            away_team_external_id: 2,
        }
    }

    #[test]
    fn claim_takes_matching_items_and_keeps_order_of_rest() {
        let mut q = PendingFixtures::new();
        for (id, day) in [(1, 3), (2, 10), (3, 4), (4, 11)] {
            q.push(fx(id, day));
        }

        let claimed = q.claim(|f| f.kickoff_utc.day() < 10);
        assert_eq!(
            claimed.iter().map(|f| f.external_id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(
            q.iter().map(|f| f.external_id).collect::<Vec<_>>(),
            vec![2, 4]
        );
    }

    #[test]
    fn claim_nothing_leaves_queue_untouched() {
        let mut q = PendingFixtures::new();
        q.push(fx(7, 1));
        assert!(q.claim(|_| false).is_empty());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn rejected_claims_can_be_requeued() {
        let mut q = PendingFixtures::new();
        q.push(fx(1, 1));
        q.push(fx(2, 2));
        let claimed = q.claim(|_| true);
        assert!(q.is_empty());
        q.push(claimed[1].clone());
        assert_eq!(q.into_inner()[0].external_id, 2);
    }
}
