use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use mpl_config::{report_unused_keys, AppSettings, ConfigMode, UnusedKeyPolicy};
use mpl_db::PgStore;
use mpl_fixtures::ApiSportsProvider;
use mpl_reconcile::{
    RoundTimespanPolicy, Season, SeasonRepository, SeasonSynchronizer, SyncConfig, SyncReport,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mpl")]
#[command(about = "Prediction league fixture sync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Reconcile seasons against the fixture feed
    Sync {
        #[command(subcommand)]
        cmd: SyncCmd,
    },

    /// Print the round window for a start instant and whether a kickoff falls in it
    Window {
        /// Round start (RFC 3339)
        #[arg(long)]
        round_start: String,

        /// Kickoff to test (RFC 3339)
        #[arg(long)]
        kickoff: String,

        #[arg(long, default_value = "wednesday")]
        anchor: String,

        /// IANA time zone the week is counted in
        #[arg(long, default_value = "UTC")]
        tz: String,
    },

    /// Season rows
    Season {
        #[command(subcommand)]
        cmd: SeasonCmd,
    },

    /// Team rows
    Team {
        #[command(subcommand)]
        cmd: TeamCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum SyncCmd {
    /// Sync one season
    Season {
        #[arg(long)]
        season_id: Uuid,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Sync every season linked to a competition, one after another
    All {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SeasonCmd {
    /// Create a season and print its id
    Add {
        #[arg(long)]
        name: String,

        /// Feed competition id; omit to keep the season out of sync
        #[arg(long)]
        competition_id: Option<i64>,

        #[arg(long)]
        start_year: i32,
    },

    List,
}

#[derive(Subcommand)]
enum TeamCmd {
    /// Create or rename the team with this feed id
    Add {
        #[arg(long)]
        external_id: i64,

        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = mpl_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = mpl_db::status(&pool).await?;
                    println!("db_ok={} has_rounds_table={}", s.ok, s.has_rounds_table);
                }
                DbCmd::Migrate => {
                    mpl_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = mpl_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Sync { cmd } => match cmd {
            SyncCmd::Season {
                season_id,
                config_paths,
            } => {
                let settings = load_settings(&config_paths)?;
                let sync = build_synchronizer(&settings).await?;
                let cancel = cancel_on_ctrl_c();

                let report = sync
                    .synchronize(season_id, &cancel)
                    .await
                    .with_context(|| format!("sync season {season_id} failed"))?;
                print_report(&report);
            }

            SyncCmd::All { config_paths } => {
                let settings = load_settings(&config_paths)?;
                let sync = build_synchronizer(&settings).await?;
                let cancel = cancel_on_ctrl_c();

                let seasons = sync
                    .seasons()
                    .list_sync_enabled_seasons(&cancel)
                    .await
                    .context("list seasons failed")?;

                let mut failed = 0usize;
                for season in &seasons {
                    match sync.synchronize(season.season_id, &cancel).await {
                        Ok(report) => print_report(&report),
                        Err(e) => {
                            failed += 1;
                            error!(season_id = %season.season_id, error = %e, "season sync failed");
                            println!("season_id={} status=FAILED error={}", season.season_id, e);
                        }
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                }
                println!("seasons_total={} seasons_failed={}", seasons.len(), failed);
                if failed > 0 {
                    anyhow::bail!("{failed} season sync(s) failed");
                }
            }
        },

        Commands::Window {
            round_start,
            kickoff,
            anchor,
            tz,
        } => {
            let policy = RoundTimespanPolicy::from_names(&anchor, &tz)?;
            let start = parse_utc(&round_start, "--round-start")?;
            let kickoff = parse_utc(&kickoff, "--kickoff")?;
            let w = policy.window_for(start);
            println!("anchor={:?}", policy.anchor());
            println!("timezone={}", policy.timezone());
            println!("window_start_utc={}", w.start.to_rfc3339());
            println!("window_end_utc={}", w.end.to_rfc3339());
            println!("belongs={}", w.contains(kickoff));
        }

        Commands::Season { cmd } => {
            let pool = mpl_db::connect_from_env().await?;
            match cmd {
                SeasonCmd::Add {
                    name,
                    competition_id,
                    start_year,
                } => {
                    let season = Season {
                        season_id: Uuid::new_v4(),
                        name,
                        external_competition_id: competition_id,
                        start_year,
                    };
                    mpl_db::upsert_season(&pool, &season).await?;
                    println!("season_id={}", season.season_id);
                    println!("sync_enabled={}", season.sync_enabled());
                }
                SeasonCmd::List => {
                    for s in mpl_db::list_seasons(&pool).await? {
                        println!(
                            "season_id={} name={:?} start_year={} competition_id={}",
                            s.season_id,
                            s.name,
                            s.start_year,
                            s.external_competition_id
                                .map(|c| c.to_string())
                                .unwrap_or_else(|| "NULL".to_string())
                        );
                    }
                }
            }
        }

        Commands::Team { cmd } => {
            let pool = mpl_db::connect_from_env().await?;
            match cmd {
                TeamCmd::Add { external_id, name } => {
                    let team = mpl_db::upsert_team(&pool, external_id, &name).await?;
                    println!("team_id={} external_id={}", team.team_id, team.external_id);
                }
            }
        }
    }

    Ok(())
}

fn load_settings(config_paths: &[String]) -> Result<AppSettings> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = mpl_config::load_layered_yaml(&path_refs)?;
    let unused = report_unused_keys(ConfigMode::Sync, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not used by sync");
    }
    loaded.settings()
}

async fn build_synchronizer(settings: &AppSettings) -> Result<SeasonSynchronizer> {
    let config = SyncConfig::from_settings(&settings.sync)?;
    let provider = ApiSportsProvider::from_settings(&settings.provider)?;
    let pool = mpl_db::connect_from_env().await?;
    let store = Arc::new(PgStore::new(pool));
    Ok(SeasonSynchronizer::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(provider),
        config,
    ))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received; cancelling sync");
            token.cancel();
        }
    });
    cancel
}

fn parse_utc(s: &str, flag: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .with_context(|| format!("{flag}: expected RFC 3339 timestamp, got '{s}'"))
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

fn print_report(r: &SyncReport) {
    println!("season_id={}", r.season_id);
    println!("sync_enabled={}", r.sync_enabled);
    println!("labels_seen={}", r.labels_seen);
    println!("rounds_created={}", r.rounds_created);
    println!("rounds_updated={}", r.rounds_updated);
    println!("matches_created={}", r.matches_created);
    println!("matches_moved={}", r.matches_moved);
    println!("kickoffs_updated={}", r.kickoffs_updated);
    println!("skipped_labels={}", r.skipped_labels.join("|"));
    println!("unresolved_fixtures={}", join_ids(&r.unresolved_fixtures));
    println!("unplaced_fixtures={}", join_ids(&r.unplaced_fixtures));
}
