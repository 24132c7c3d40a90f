//! Fixture feed driven entirely by the test. The script can be edited
//! between sync runs to simulate reschedules, relabels and outages.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mpl_fixtures::{Fixture, FixtureProvider, ProviderError};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Script {
    labels: Vec<String>,
    fixtures: Vec<Fixture>,
    fail_next: Option<ProviderError>,
    cancel_on_fixtures: Option<CancellationToken>,
    calls: usize,
}

#[derive(Default)]
pub struct ScriptedFixtureProvider {
    script: Mutex<Script>,
}

impl ScriptedFixtureProvider {
    pub fn new(labels: &[&str], fixtures: Vec<Fixture>) -> Self {
        let p = Self::default();
        p.set_feed(labels, fixtures);
        p
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_feed(&self, labels: &[&str], fixtures: Vec<Fixture>) {
        let mut s = self.lock();
        s.labels = labels.iter().map(|l| l.to_string()).collect();
        s.fixtures = fixtures;
    }

    pub fn push_fixture(&self, fixture: Fixture) {
        self.lock().fixtures.push(fixture);
    }

    /// Returns false when no fixture has that id.
    pub fn reschedule(&self, external_id: i64, kickoff_utc: DateTime<Utc>) -> bool {
        let mut s = self.lock();
        match s.fixtures.iter_mut().find(|f| f.external_id == external_id) {
            Some(f) => {
                f.kickoff_utc = kickoff_utc;
                true
            }
            None => false,
        }
    }

    pub fn relabel(&self, external_id: i64, label: &str) -> bool {
        let mut s = self.lock();
        match s.fixtures.iter_mut().find(|f| f.external_id == external_id) {
            Some(f) => {
                f.round_label = label.to_string();
                true
            }
            None => false,
        }
    }

    /// The next provider call returns `err`.
    pub fn fail_next(&self, err: ProviderError) {
        self.lock().fail_next = Some(err);
    }

    /// Cancel `token` while serving the next fixture listing.
    pub fn cancel_during_fixtures(&self, token: CancellationToken) {
        self.lock().cancel_on_fixtures = Some(token);
    }

    /// Provider calls served so far.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn begin(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, Script>, ProviderError> {
        let mut s = self.lock();
        s.calls += 1;
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if let Some(err) = s.fail_next.take() {
            return Err(err);
        }
        Ok(s)
    }
}

#[async_trait]
impl FixtureProvider for ScriptedFixtureProvider {
    fn source_name(&self) -> &'static str {
        "scripted"
    }

    async fn round_labels(
        &self,
        _competition_id: i64,
        _season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(self.begin(cancel)?.labels.clone())
    }

    async fn season_fixtures(
        &self,
        _competition_id: i64,
        _season_year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fixture>, ProviderError> {
        let mut s = self.begin(cancel)?;
        if let Some(token) = s.cancel_on_fixtures.take() {
            token.cancel();
        }
        Ok(s.fixtures.clone())
    }
}
