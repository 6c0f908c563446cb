use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::debug;

use crate::import::ports::LocalStore;
use crate::model::{LeaderboardType, LocalRun, RunType, Taxon};
use crate::store::db::Db;

const RUN_COLUMNS: &str = "player_name, player2_name, \
    COALESCE(category_id::text, '') AS category_id, src_category_name, \
    COALESCE(platform_id::text, '') AS platform_id, src_platform_name, \
    level_id::text AS level_id, src_level_name, run_type, leaderboard_type, \
    time, date, video_url, comment, verified, imported_from_src, src_run_id";

/// `LocalStore` over the site's Postgres database.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn list_taxa(&self, table: &'static str) -> Result<Vec<Taxon>> {
        let sql = format!("SELECT id::text AS id, name FROM {table} ORDER BY id");
        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .with_context(|| format!("list {table}"))?;
        rows.iter()
            .map(|r| -> Result<Taxon> {
                Ok(Taxon::new(
                    r.try_get::<String, _>("id")?,
                    r.try_get::<String, _>("name")?,
                ))
            })
            .collect()
    }
}

fn run_from_row(row: &PgRow) -> Result<LocalRun> {
    let run_type: String = row.try_get("run_type")?;
    let leaderboard_type: String = row.try_get("leaderboard_type")?;
    Ok(LocalRun {
        player_name: row.try_get("player_name")?,
        player2_name: row.try_get("player2_name")?,
        category_id: row.try_get("category_id")?,
        src_category_name: row.try_get("src_category_name")?,
        platform_id: row.try_get("platform_id")?,
        src_platform_name: row.try_get("src_platform_name")?,
        level_id: row.try_get("level_id")?,
        src_level_name: row.try_get("src_level_name")?,
        run_type: RunType::parse(&run_type).unwrap_or_default(),
        leaderboard_type: LeaderboardType::parse(&leaderboard_type).unwrap_or_default(),
        time: row.try_get("time")?,
        date: row.try_get("date")?,
        video_url: row.try_get("video_url")?,
        comment: row.try_get("comment")?,
        verified: row.try_get("verified")?,
        imported_from_src: row.try_get("imported_from_src")?,
        src_run_id: row.try_get("src_run_id")?,
    })
}

#[async_trait]
impl LocalStore for PgStore {
    async fn list_categories(&self) -> Result<Vec<Taxon>> {
        self.list_taxa("categories").await
    }

    async fn list_platforms(&self) -> Result<Vec<Taxon>> {
        self.list_taxa("platforms").await
    }

    async fn list_levels(&self) -> Result<Vec<Taxon>> {
        self.list_taxa("levels").await
    }

    async fn list_verified_runs(&self) -> Result<Vec<LocalRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM leaderboard_entries WHERE verified = TRUE");
        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .context("list verified leaderboard entries")?;
        rows.iter().map(run_from_row).collect()
    }

    async fn list_imported_src_run_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT src_run_id FROM leaderboard_entries WHERE src_run_id IS NOT NULL",
        )
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await
        .context("list imported src run ids")?;
        Ok(ids)
    }

    async fn find_player_by_name(&self, name: &str) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id::text FROM players WHERE lower(display_name) = lower($1) ORDER BY id LIMIT 1",
        )
        .persistent(false)
        .bind(name.trim())
        .fetch_optional(&self.db.pool)
        .await
        .context("find player by display name")?;
        Ok(id)
    }

    async fn insert_run(&self, run: &LocalRun) -> Result<String> {
        let id: String = sqlx::query_scalar(
            "INSERT INTO leaderboard_entries (
                player_name, player2_name, category_id, src_category_name,
                platform_id, src_platform_name, level_id, src_level_name,
                run_type, leaderboard_type, time, date, video_url, comment,
                verified, imported_from_src, src_run_id
             ) VALUES (
                $1, $2, NULLIF($3, '')::bigint, $4,
                NULLIF($5, '')::bigint, $6, NULLIF($7, '')::bigint, $8,
                $9, $10, $11, $12, $13, $14,
                $15, $16, $17
             ) RETURNING id::text",
        )
        .persistent(false)
        .bind(&run.player_name)
        .bind(&run.player2_name)
        .bind(&run.category_id)
        .bind(&run.src_category_name)
        .bind(&run.platform_id)
        .bind(&run.src_platform_name)
        .bind(run.level_id.as_deref().unwrap_or(""))
        .bind(&run.src_level_name)
        .bind(run.run_type.as_str())
        .bind(run.leaderboard_type.as_str())
        .bind(&run.time)
        .bind(&run.date)
        .bind(&run.video_url)
        .bind(&run.comment)
        .bind(run.verified)
        .bind(run.imported_from_src)
        .bind(&run.src_run_id)
        .fetch_one(&self.db.pool)
        .await
        .context("insert leaderboard entry")?;
        debug!(target = "store", %id, src_run_id = ?run.src_run_id, "entry inserted");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    const SCHEMA: &str = include_str!("../../migrations/0001_leaderboard.sql");

    fn table_columns(table: &str) -> Vec<String> {
        let start = format!("CREATE TABLE IF NOT EXISTS {table} (");
        let body = SCHEMA
            .split_once(start.as_str())
            .and_then(|(_, rest)| rest.split_once(");"))
            .map(|(body, _)| body)
            .unwrap_or_default();
        body.lines()
            .filter_map(|l| l.split_whitespace().next())
            .map(|c| c.trim_end_matches(',').to_string())
            .collect()
    }

    #[test]
    fn taxonomy_tables_hold_only_what_list_taxa_reads() {
        for table in ["categories", "platforms", "levels"] {
            assert_eq!(table_columns(table), vec!["id", "name"], "{table}");
        }
    }
}
