//! Postgres implementation of the synchronizer's persistence traits.
//!
//! Each round write is one transaction: the round row plus an upsert of every
//! match it owns. Upserting by `match_id` also re-points a match that moved in
//! from another round; nothing is ever deleted here.

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use mpl_reconcile::{
    Match, MatchStatus, NewRound, Round, RoundStatus, RoundStore, Season, SeasonRepository, Team,
    TeamResolver,
};

use crate::season_from_row;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Race `fut` against the token. A dropped transaction rolls back.
async fn or_cancel<T, F>(cancel: &CancellationToken, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("{what} cancelled")),
        res = fut => res,
    }
}

fn match_from_row(row: &sqlx::postgres::PgRow) -> Result<(Uuid, Match)> {
    Ok((
        row.try_get("round_id")?,
        Match {
            match_id: row.try_get("match_id")?,
            external_id: row.try_get("external_id")?,
            kickoff_utc: row.try_get("kickoff_utc")?,
            home_team_id: row.try_get("home_team_id")?,
            away_team_id: row.try_get("away_team_id")?,
            status: MatchStatus::parse(&row.try_get::<String, _>("status")?)?,
        },
    ))
}

fn round_from_row(row: &sqlx::postgres::PgRow) -> Result<Round> {
    Ok(Round {
        round_id: row.try_get("round_id")?,
        season_id: row.try_get("season_id")?,
        round_number: row.try_get("round_number")?,
        start_utc: row.try_get("start_utc")?,
        deadline_utc: row.try_get("deadline_utc")?,
        status: RoundStatus::parse(&row.try_get::<String, _>("status")?)?,
        external_label: row.try_get("external_label")?,
        matches: Vec::new(),
    })
}

async fn upsert_matches(
    tx: &mut Transaction<'_, Postgres>,
    round_id: Uuid,
    season_id: Uuid,
    matches: &[Match],
) -> Result<()> {
    for m in matches {
        sqlx::query(
            r#"
            insert into matches (
              match_id, round_id, season_id, external_id, kickoff_utc,
              home_team_id, away_team_id, status
            ) values ($1, $2, $3, $4, $5, $6, $7, $8)
            on conflict (match_id) do update
              set round_id = excluded.round_id,
                  external_id = excluded.external_id,
                  kickoff_utc = excluded.kickoff_utc,
                  home_team_id = excluded.home_team_id,
                  away_team_id = excluded.away_team_id,
                  status = excluded.status,
                  updated_at_utc = now()
            "#,
        )
        .bind(m.match_id)
        .bind(round_id)
        .bind(season_id)
        .bind(m.external_id)
        .bind(m.kickoff_utc)
        .bind(m.home_team_id)
        .bind(m.away_team_id)
        .bind(m.status.as_str())
        .execute(&mut **tx)
        .await
        .with_context(|| format!("upsert match {} failed", m.match_id))?;
    }
    Ok(())
}

#[async_trait]
impl SeasonRepository for PgStore {
    async fn get_season(&self, season_id: Uuid, cancel: &CancellationToken) -> Result<Option<Season>> {
        or_cancel(cancel, "get_season", async {
            let row = sqlx::query(
                r#"
                select season_id, name, external_competition_id, start_year
                from seasons
                where season_id = $1
                "#,
            )
            .bind(season_id)
            .fetch_optional(&self.pool)
            .await
            .context("get_season failed")?;
            row.as_ref().map(season_from_row).transpose()
        })
        .await
    }

    async fn list_sync_enabled_seasons(&self, cancel: &CancellationToken) -> Result<Vec<Season>> {
        or_cancel(cancel, "list_sync_enabled_seasons", async {
            let rows = sqlx::query(
                r#"
                select season_id, name, external_competition_id, start_year
                from seasons
                where external_competition_id is not null
                order by start_year, name
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .context("list_sync_enabled_seasons failed")?;
            rows.iter().map(season_from_row).collect()
        })
        .await
    }
}

#[async_trait]
impl TeamResolver for PgStore {
    async fn get_by_external_id(&self, external_id: i64, cancel: &CancellationToken) -> Result<Option<Team>> {
        or_cancel(cancel, "get_team", async {
            let row = sqlx::query("select team_id, external_id, name from teams where external_id = $1")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await
                .context("get_team_by_external_id failed")?;
            match row {
                Some(r) => Ok(Some(Team {
                    team_id: r.try_get("team_id")?,
                    external_id: r.try_get("external_id")?,
                    name: r.try_get("name")?,
                })),
                None => Ok(None),
            }
        })
        .await
    }
}

#[async_trait]
impl RoundStore for PgStore {
    async fn get_all_rounds_for_season(
        &self,
        season_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<Uuid, Round>> {
        or_cancel(cancel, "get_all_rounds_for_season", async {
            let round_rows = sqlx::query(
                r#"
                select round_id, season_id, round_number, start_utc, deadline_utc, status, external_label
                from rounds
                where season_id = $1
                "#,
            )
            .bind(season_id)
            .fetch_all(&self.pool)
            .await
            .context("load rounds failed")?;

            let mut rounds = BTreeMap::new();
            for row in &round_rows {
                let r = round_from_row(row)?;
                rounds.insert(r.round_id, r);
            }

            let match_rows = sqlx::query(
                r#"
                select match_id, round_id, external_id, kickoff_utc, home_team_id, away_team_id, status
                from matches
                where season_id = $1
                order by kickoff_utc, external_id
                "#,
            )
            .bind(season_id)
            .fetch_all(&self.pool)
            .await
            .context("load matches failed")?;

            for row in &match_rows {
                let (round_id, m) = match_from_row(row)?;
                match rounds.get_mut(&round_id) {
                    Some(r) => r.matches.push(m),
                    None => return Err(anyhow!("match {} points at unknown round {}", m.match_id, round_id)),
                }
            }
            Ok(rounds)
        })
        .await
    }

    async fn create_round(&self, round: NewRound, cancel: &CancellationToken) -> Result<Round> {
        let round_id = Uuid::new_v4();
        or_cancel(cancel, "create_round", async {
            let mut tx = self.pool.begin().await.context("begin tx failed")?;
            sqlx::query(
                r#"
                insert into rounds (
                  round_id, season_id, round_number, start_utc, deadline_utc, status, external_label
                ) values ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(round_id)
            .bind(round.season_id)
            .bind(round.round_number)
            .bind(round.start_utc)
            .bind(round.deadline_utc)
            .bind(round.status.as_str())
            .bind(&round.external_label)
            .execute(&mut *tx)
            .await
            .context("insert round failed")?;

            upsert_matches(&mut tx, round_id, round.season_id, &round.matches).await?;
            tx.commit().await.context("commit create_round failed")?;
            Ok(())
        })
        .await?;

        debug!(round_id = %round_id, round_number = round.round_number, matches = round.matches.len(), "round inserted");
        Ok(round.into_round(round_id))
    }

    async fn update_round(&self, round: &Round, cancel: &CancellationToken) -> Result<()> {
        or_cancel(cancel, "update_round", async {
            let mut tx = self.pool.begin().await.context("begin tx failed")?;
            let res = sqlx::query(
                r#"
                update rounds
                   set round_number = $2,
                       start_utc = $3,
                       deadline_utc = $4,
                       status = $5,
                       external_label = $6,
                       updated_at_utc = now()
                 where round_id = $1
                "#,
            )
            .bind(round.round_id)
            .bind(round.round_number)
            .bind(round.start_utc)
            .bind(round.deadline_utc)
            .bind(round.status.as_str())
            .bind(&round.external_label)
            .execute(&mut *tx)
            .await
            .context("update round failed")?;

            if res.rows_affected() != 1 {
                return Err(anyhow!("round not found: {}", round.round_id));
            }

            upsert_matches(&mut tx, round.round_id, round.season_id, &round.matches).await?;
            tx.commit().await.context("commit update_round failed")?;
            Ok(())
        })
        .await
    }
}
