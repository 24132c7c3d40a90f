use chrono::Duration;
use mpl_reconcile::SyncConfig;
use mpl_testkit::{assert_schedule_consistent, assert_windows_hold, fixture, kickoff, SeasonWorld};
use tokio_util::sync::CancellationToken;

const L1: &str = "Regular Season - 1";
const L2: &str = "Regular Season - 2";
const L3: &str = "Regular Season - 3";

#[tokio::test]
async fn first_sync_creates_one_round_per_label() -> anyhow::Result<()> {
    let world = SeasonWorld::new(20);
    world.feed.set_feed(
        &[L1, L2, L3],
        vec![
            fixture(101, L1, kickoff(2024, 8, 17, 14, 0), 1, 2),
            fixture(102, L1, kickoff(2024, 8, 18, 16, 0), 3, 4),
            fixture(103, L1, kickoff(2024, 8, 16, 19, 0), 5, 6),
            fixture(201, L2, kickoff(2024, 8, 24, 14, 0), 2, 1),
            fixture(202, L2, kickoff(2024, 8, 25, 14, 0), 4, 3),
            fixture(301, L3, kickoff(2024, 8, 31, 14, 0), 1, 3),
            fixture(302, L3, kickoff(2024, 9, 1, 14, 0), 2, 4),
        ],
    );

    let sync = world.synchronizer(SyncConfig::default());
    let report = sync
        .synchronize(world.season_id(), &CancellationToken::new())
        .await?;

    assert!(report.sync_enabled);
    assert_eq!(report.labels_seen, 3);
    assert_eq!(report.rounds_created, 3);
    assert_eq!(report.rounds_updated, 0);
    assert_eq!(report.matches_created, 7);
    assert!(report.unplaced_fixtures.is_empty());

    let rounds = world.rounds();
    assert_eq!(
        rounds.iter().map(|r| r.round_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(rounds[0].start_utc, kickoff(2024, 8, 16, 19, 0));
    assert_eq!(rounds[0].deadline_utc, kickoff(2024, 8, 16, 19, 0) - Duration::minutes(30));
    assert_eq!(rounds[1].start_utc, kickoff(2024, 8, 24, 14, 0));
    assert_eq!(rounds[2].start_utc, kickoff(2024, 8, 31, 14, 0));
    assert_eq!(
        rounds.iter().map(|r| r.matches.len()).collect::<Vec<_>>(),
        vec![3, 2, 2]
    );
    assert_eq!(rounds[0].external_label.as_deref(), Some(L1));

    assert_schedule_consistent(&rounds);
    assert_windows_hold(&rounds, &sync.config().policy);
    assert_eq!(world.store.counters().total(), 3);
    Ok(())
}

#[tokio::test]
async fn custom_deadline_offset_is_applied() -> anyhow::Result<()> {
    let world = SeasonWorld::new(4);
    world.feed.set_feed(&[L1], vec![fixture(1, L1, kickoff(2024, 8, 17, 14, 0), 1, 2)]);
    let config = SyncConfig {
        deadline_offset: Duration::hours(2),
        ..SyncConfig::default()
    };

    world
        .synchronizer(config)
        .synchronize(world.season_id(), &CancellationToken::new())
        .await?;

    let r = &world.rounds()[0];
    assert_eq!(r.deadline_utc, kickoff(2024, 8, 17, 12, 0));
    Ok(())
}

#[tokio::test]
async fn fixtures_under_unlisted_labels_are_ignored() -> anyhow::Result<()> {
    let world = SeasonWorld::new(4);
    world.feed.set_feed(
        &[L1],
        vec![
            fixture(1, L1, kickoff(2024, 8, 17, 14, 0), 1, 2),
            fixture(2, "Friendlies - 1", kickoff(2024, 8, 18, 14, 0), 3, 4),
        ],
    );

    let report = world
        .synchronizer(SyncConfig::default())
        .synchronize(world.season_id(), &CancellationToken::new())
        .await?;

    assert_eq!(report.matches_created, 1);
    assert_eq!(world.store.owner_of(world.season_id(), 2), None);
    Ok(())
}

#[tokio::test]
async fn label_without_fixtures_creates_no_round() -> anyhow::Result<()> {
    let world = SeasonWorld::new(4);
    world.feed.set_feed(&[L1, L2], vec![fixture(1, L1, kickoff(2024, 8, 17, 14, 0), 1, 2)]);

    let report = world
        .synchronizer(SyncConfig::default())
        .synchronize(world.season_id(), &CancellationToken::new())
        .await?;

    assert_eq!(report.rounds_created, 1);
    assert!(world.store.round_by_label(world.season_id(), L2).is_none());
    Ok(())
}
