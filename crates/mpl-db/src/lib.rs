use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use mpl_reconcile::{Season, Team};

mod store;

pub use store::PgStore;

pub const ENV_DB_URL: &str = "MPL_DATABASE_URL";

/// Connect to Postgres using MPL_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='rounds'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_rounds_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_rounds_table: bool,
}

/// Insert or update a season row.
pub async fn upsert_season(pool: &PgPool, season: &Season) -> Result<()> {
    sqlx::query(
        r#"
        insert into seasons (season_id, name, external_competition_id, start_year)
        values ($1, $2, $3, $4)
        on conflict (season_id) do update
          set name = excluded.name,
              external_competition_id = excluded.external_competition_id,
              start_year = excluded.start_year
        "#,
    )
    .bind(season.season_id)
    .bind(&season.name)
    .bind(season.external_competition_id)
    .bind(season.start_year)
    .execute(pool)
    .await
    .context("upsert_season failed")?;
    Ok(())
}

pub async fn list_seasons(pool: &PgPool) -> Result<Vec<Season>> {
    let rows = sqlx::query(
        r#"
        select season_id, name, external_competition_id, start_year
        from seasons
        order by start_year, name
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_seasons failed")?;

    rows.iter().map(season_from_row).collect()
}

pub(crate) fn season_from_row(row: &sqlx::postgres::PgRow) -> Result<Season> {
    Ok(Season {
        season_id: row.try_get("season_id")?,
        name: row.try_get("name")?,
        external_competition_id: row.try_get("external_competition_id")?,
        start_year: row.try_get("start_year")?,
    })
}

/// Insert a team, or rename the one already holding `external_id`.
/// Returns the stored row.
pub async fn upsert_team(pool: &PgPool, external_id: i64, name: &str) -> Result<Team> {
    let row = sqlx::query(
        r#"
        insert into teams (team_id, external_id, name)
        values ($1, $2, $3)
        on conflict (external_id) do update set name = excluded.name
        returning team_id, external_id, name
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(external_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .context("upsert_team failed")?;

    Ok(Team {
        team_id: row.try_get("team_id")?,
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
    })
}
