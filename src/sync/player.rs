//! Player synchronizer: the league-wide roster into the `players` table

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{error, info, instrument};

use crate::error::AppError;
use crate::fetcher::league::LeagueFetcher;
use crate::fetcher::resultsets;

use super::{SyncOutcome, SyncStatus};

/// One parsed roster row.
#[derive(Debug, Clone)]
pub struct PlayerRow {
    pub person_id: i64,
    pub display_last_comma_first: String,
    pub display_first_last: String,
    pub roster_status: i64,
    pub from_year: String,
    pub to_year: String,
    pub player_slug: String,
    /// None means free agent (the roster encodes this as team id 0).
    pub team_id: Option<i64>,
    pub games_played_flag: String,
}

/// Parses the `commonallplayers` result set. Rows without a person id are
/// dropped; a zero team id becomes NULL.
pub fn parse_players(payload: &Value) -> Result<Vec<PlayerRow>, AppError> {
    let Some(set) = resultsets::first(payload) else {
        return Err(AppError::api_unexpected_structure(
            "roster payload has no resultSets",
            "commonallplayers",
        ));
    };

    let mut rows = Vec::new();
    for row in set.rows() {
        let Some(person_id) = row.i64("PERSON_ID") else {
            continue;
        };
        let team_id = match row.i64("TEAM_ID") {
            Some(0) | None => None,
            Some(id) => Some(id),
        };

        rows.push(PlayerRow {
            person_id,
            display_last_comma_first: row
                .str("DISPLAY_LAST_COMMA_FIRST")
                .unwrap_or("")
                .to_string(),
            display_first_last: row.str("DISPLAY_FIRST_LAST").unwrap_or("").to_string(),
            roster_status: row.i64("ROSTERSTATUS").unwrap_or(0),
            from_year: row.str_or_number("FROM_YEAR").unwrap_or_default(),
            to_year: row.str_or_number("TO_YEAR").unwrap_or_default(),
            player_slug: row.str("PLAYERCODE").unwrap_or("").to_string(),
            team_id,
            games_played_flag: row.str("GAMES_PLAYED_FLAG").unwrap_or("").to_string(),
        });
    }

    info!("Parsed {} roster rows", rows.len());
    Ok(rows)
}

/// Syncs the league roster. Historical players stay in the table; roster
/// moves simply update `team_id`.
#[derive(Debug)]
pub struct PlayerSync {
    pool: SqlitePool,
    league_fetcher: LeagueFetcher,
}

impl PlayerSync {
    pub fn new(pool: SqlitePool, league_fetcher: LeagueFetcher) -> Self {
        PlayerSync {
            pool,
            league_fetcher,
        }
    }

    async fn existing_count(&self) -> Result<u64, AppError> {
        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM players")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as u64)
    }

    #[instrument(skip(self))]
    pub async fn sync(&self, force: bool) -> Result<SyncOutcome, AppError> {
        if !force {
            let existing = self.existing_count().await?;
            if existing > 0 {
                info!("Players table already has {existing} rows, skipping sync");
                return Ok(SyncOutcome {
                    count: existing,
                    status: SyncStatus::Skipped,
                });
            }
        }

        let payload = self.league_fetcher.get_all_players(false).await?;
        let rows = parse_players(&payload)?;
        let count = self.import_players(&rows).await?;
        info!("Synced {count} player rows");

        Ok(SyncOutcome {
            count,
            status: SyncStatus::Success,
        })
    }

    /// Upserts roster rows in one transaction; failing rows are skipped.
    pub async fn import_players(&self, rows: &[PlayerRow]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().to_rfc3339();
        let mut success = 0u64;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO players (
                    person_id, display_last_comma_first, display_first_last,
                    roster_status, from_year, to_year, player_slug, team_id,
                    games_played_flag, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(person_id) DO UPDATE SET
                    display_last_comma_first = excluded.display_last_comma_first,
                    display_first_last = excluded.display_first_last,
                    roster_status = excluded.roster_status,
                    from_year = excluded.from_year,
                    to_year = excluded.to_year,
                    player_slug = excluded.player_slug,
                    team_id = excluded.team_id,
                    games_played_flag = excluded.games_played_flag,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(row.person_id)
            .bind(&row.display_last_comma_first)
            .bind(&row.display_first_last)
            .bind(row.roster_status)
            .bind(&row.from_year)
            .bind(&row.to_year)
            .bind(&row.player_slug)
            .bind(row.team_id)
            .bind(&row.games_played_flag)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => success += 1,
                Err(e) => error!("Upserting player {} failed: {e}", row.person_id),
            }
        }

        tx.commit().await?;
        info!("Saved {success}/{} player rows", rows.len());
        Ok(success)
    }
}
