use std::sync::Arc;

use mpl_fixtures::ProviderError;
use mpl_reconcile::{SyncConfig, SyncError};
use mpl_testkit::{fixture, kickoff, season, SeasonWorld};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const L1: &str = "Regular Season - 1";

fn one_round() -> SeasonWorld {
    let world = SeasonWorld::new(4);
    world
        .feed
        .set_feed(&[L1], vec![fixture(1, L1, kickoff(2024, 8, 17, 14, 0), 1, 2)]);
    world
}

#[tokio::test]
async fn unknown_season_is_not_found() {
    let world = one_round();
    let missing = Uuid::new_v4();
    let err = world
        .synchronizer(SyncConfig::default())
        .synchronize(missing, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SeasonNotFound(id) if id == missing));
    assert_eq!(world.feed.calls(), 0);
}

#[tokio::test]
async fn season_without_competition_id_is_a_no_op() -> anyhow::Result<()> {
    let world = one_round();
    let unlinked = season(None);
    world.store.add_season(unlinked.clone());

    let report = world
        .synchronizer(SyncConfig::default())
        .synchronize(unlinked.season_id, &CancellationToken::new())
        .await?;

    assert!(!report.sync_enabled);
    assert_eq!(report.writes(), 0);
    assert_eq!(world.feed.calls(), 0);
    assert!(world.store.rounds(unlinked.season_id).is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelled_token_stops_before_any_io() {
    let world = one_round();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = world
        .synchronizer(SyncConfig::default())
        .synchronize(world.season_id(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(world.feed.calls(), 0);
    assert_eq!(world.store.counters().total(), 0);
}

#[tokio::test]
async fn cancellation_mid_fetch_aborts_before_writes() {
    let world = one_round();
    let cancel = CancellationToken::new();
    world.feed.cancel_during_fixtures(cancel.clone());

    let err = world
        .synchronizer(SyncConfig::default())
        .synchronize(world.season_id(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(world.feed.calls(), 2);
    assert!(world.rounds().is_empty());
}

#[tokio::test]
async fn provider_failure_propagates_and_leaves_store_untouched() {
    let world = one_round();
    world.feed.fail_next(ProviderError::Api {
        code: Some(429),
        message: "rate limited".to_string(),
    });

    let err = world
        .synchronizer(SyncConfig::default())
        .synchronize(world.season_id(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SyncError::Provider(ProviderError::Api { code, .. }) => assert_eq!(code, Some(429)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(world.rounds().is_empty());
}

#[tokio::test]
async fn store_failure_surfaces_as_store_error() {
    let world = one_round();
    world.store.fail_writes(Some("disk full"));

    let err = world
        .synchronizer(SyncConfig::default())
        .synchronize(world.season_id(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Store(_)));
    assert!(err.to_string().contains("disk full"));
}

#[tokio::test]
async fn synchronizer_is_shareable_across_tasks() -> anyhow::Result<()> {
    let world = one_round();
    let sync = Arc::new(world.synchronizer(SyncConfig::default()));
    let season_id = world.season_id();

    let handle = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.synchronize(season_id, &CancellationToken::new()).await })
    };
    let report = handle.await??;
    assert_eq!(report.rounds_created, 1);
    Ok(())
}
