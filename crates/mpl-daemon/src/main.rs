//! mpl-daemon entry point.
//!
//! Thin: sets up tracing, loads config, wires the synchronizer to Postgres
//! and the fixture feed, starts the sync scheduler and the HTTP server.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use mpl_config::{report_unused_keys, ConfigMode, UnusedKeyPolicy};
use mpl_daemon::{routes, state};
use mpl_db::PgStore;
use mpl_fixtures::ApiSportsProvider;
use mpl_reconcile::{SeasonSynchronizer, SyncConfig};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "mpl-daemon", about = "Scheduled fixture sync service")]
struct Args {
    /// Layered config paths in merge order
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    let args = Args::parse();

    let path_refs: Vec<&str> = args.config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = mpl_config::load_layered_yaml(&path_refs)?;
    let unused = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not used by daemon");
    }
    let settings = loaded.settings()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let pool = mpl_db::connect_from_env().await?;
    let store = Arc::new(PgStore::new(pool));
    let provider = ApiSportsProvider::from_settings(&settings.provider)?;
    let sync = SeasonSynchronizer::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(provider),
        SyncConfig::from_settings(&settings.sync)?,
    );

    let shutdown = CancellationToken::new();
    let shared = Arc::new(state::AppState::new(
        sync,
        Duration::from_secs(settings.daemon.interval_secs),
        shutdown.clone(),
    ));

    let heartbeat = state::spawn_heartbeat(Arc::clone(&shared), Duration::from_secs(1));
    let ticker = state::spawn_sync_tick(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(a) => a,
        None => settings
            .daemon
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid daemon.addr '{}'", settings.daemon.addr))?,
    };
    info!("mpl-daemon listening on http://{}", addr);

    let stop = shutdown.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested; cancelling running syncs");
            stop.cancel();
        })
        .await
        .context("server crashed")?;

    shutdown.cancel();
    let _ = ticker.await;
    let _ = heartbeat.await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("MPL_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
