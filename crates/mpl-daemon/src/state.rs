//! Shared runtime state for mpl-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The same state drives
//! the scheduled sync tick, so manual and scheduled runs share one in-flight
//! guard: a season is never synchronized twice at the same time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mpl_reconcile::{SeasonSynchronizer, SyncError, SyncReport};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    SyncStarted { season_id: Uuid, trigger: SyncTrigger },
    SyncFinished(SeasonOutcome),
    LogLine { level: String, msg: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Schedule,
    Manual,
}

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Last sync result for one season.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeasonOutcome {
    pub season_id: Uuid,
    pub trigger: SyncTrigger,
    pub finished_at_utc: DateTime<Utc>,
    pub ok: bool,
    pub report: Option<SyncReport>,
    pub error: Option<String>,
}

/// Returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub interval_secs: u64,
    pub ticks_completed: u64,
    pub in_flight: Vec<Uuid>,
    pub seasons: Vec<SeasonOutcome>,
}

// ---------------------------------------------------------------------------
// In-flight guard
// ---------------------------------------------------------------------------

/// Marks a season as syncing until dropped.
pub struct InFlightGuard {
    set: Arc<Mutex<BTreeSet<Uuid>>>,
    season_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.season_id);
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers and the tick task.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub sync: Arc<SeasonSynchronizer>,
    /// Cancelled on shutdown; passed to every running sync.
    pub shutdown: CancellationToken,
    pub interval: Duration,
    in_flight: Arc<Mutex<BTreeSet<Uuid>>>,
    outcomes: Arc<RwLock<BTreeMap<Uuid, SeasonOutcome>>>,
    ticks: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(sync: SeasonSynchronizer, interval: Duration, shutdown: CancellationToken) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "mpl-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            sync: Arc::new(sync),
            shutdown,
            interval,
            in_flight: Arc::new(Mutex::new(BTreeSet::new())),
            outcomes: Arc::new(RwLock::new(BTreeMap::new())),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claim the season for a sync; `None` while another sync holds it.
    pub fn try_begin(&self, season_id: Uuid) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(season_id) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            season_id,
        })
    }

    pub fn in_flight(&self) -> Vec<Uuid> {
        let set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.iter().copied().collect()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            interval_secs: self.interval.as_secs(),
            ticks_completed: self.ticks.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            seasons: self.outcomes.read().await.values().cloned().collect(),
        }
    }

    /// Sync one season unless it is already syncing (`None`).
    pub async fn run_season(
        &self,
        season_id: Uuid,
        trigger: SyncTrigger,
    ) -> Option<Result<SyncReport, SyncError>> {
        let _guard = self.try_begin(season_id)?;
        let _ = self.bus.send(BusMsg::SyncStarted { season_id, trigger });

        let res = self.sync.synchronize(season_id, &self.shutdown).await;
        let outcome = SeasonOutcome {
            season_id,
            trigger,
            finished_at_utc: Utc::now(),
            ok: res.is_ok(),
            report: res.as_ref().ok().cloned(),
            error: res.as_ref().err().map(|e| e.to_string()),
        };
        match &res {
            Ok(r) => info!(season_id = %season_id, trigger = ?trigger, writes = r.writes(), "season synced"),
            Err(e) => {
                error!(season_id = %season_id, trigger = ?trigger, error = %e, "season sync failed");
                let _ = self.bus.send(BusMsg::LogLine {
                    level: "ERROR".to_string(),
                    msg: format!("sync {season_id} failed: {e}"),
                });
            }
        }
        if !matches!(res, Err(SyncError::SeasonNotFound(_))) {
            self.outcomes.write().await.insert(season_id, outcome.clone());
        }
        let _ = self.bus.send(BusMsg::SyncFinished(outcome));
        Some(res)
    }

    /// One scheduler pass: every sync-enabled season, one after another.
    /// Returns how many seasons were attempted.
    pub async fn run_all(&self) -> usize {
        let seasons = match self
            .sync
            .seasons()
            .list_sync_enabled_seasons(&self.shutdown)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                error!(error = %format!("{e:#}"), "listing sync-enabled seasons failed");
                return 0;
            }
        };

        let mut attempted = 0;
        for season in seasons {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.run_season(season.season_id, SyncTrigger::Schedule).await {
                Some(_) => attempted += 1,
                None => warn!(season_id = %season.season_id, "sync already in flight; skipped this tick"),
            }
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);
        attempted
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`
/// until shutdown.
pub fn spawn_heartbeat(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let ts = Utc::now().timestamp_millis();
                    let _ = state.bus.send(BusMsg::Heartbeat { ts_millis: ts });
                }
            }
        }
    })
}

/// Spawn the scheduler: a [`AppState::run_all`] pass every `state.interval`,
/// the first one immediately. Stops on shutdown.
pub fn spawn_sync_tick(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let n = state.run_all().await;
                    info!(seasons = n, "sync tick complete");
                }
            }
        }
    })
}
