//! Team synchronizer: franchise details and logos into the `teams` table

use std::sync::Arc;

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument, warn};

use crate::constants;
use crate::error::AppError;
use crate::fetcher::league::LeagueFetcher;
use crate::fetcher::resultsets;
use crate::fetcher::team::TeamFetcher;
use crate::fetcher::BatchOptions;
use crate::http::HttpClient;

use super::{slugify, SyncOutcome, SyncStatus};

/// One parsed team row from the `TeamBackground` result set.
#[derive(Debug, Clone)]
pub struct TeamRow {
    pub team_id: i64,
    pub abbreviation: String,
    pub nickname: String,
    pub year_founded: i64,
    pub city: String,
    pub arena: String,
    pub arena_capacity: String,
    pub owner: String,
    pub general_manager: String,
    pub head_coach: String,
    pub dleague_affiliation: String,
    pub team_slug: String,
}

/// Maps a `teamdetails` payload to a row. Slug falls back to the
/// hyphenated nickname when the vendor omits it.
pub fn parse_team_details(payload: &Value, team_id: i64) -> Option<TeamRow> {
    let set = resultsets::find(payload, "TeamBackground")?;
    let row = set.first_row()?;

    let nickname = row.str("NICKNAME").unwrap_or("").to_string();
    let slug = {
        let vendor_slug = row.str("TEAM_SLUG").unwrap_or("");
        if vendor_slug.is_empty() {
            slugify(&nickname)
        } else {
            vendor_slug.to_string()
        }
    };

    Some(TeamRow {
        team_id: row.i64("TEAM_ID").unwrap_or(team_id),
        abbreviation: row.str("ABBREVIATION").unwrap_or("").to_string(),
        nickname,
        year_founded: row.i64("YEARFOUNDED").unwrap_or(0),
        city: row.str("CITY").unwrap_or("").to_string(),
        arena: row.str("ARENA").unwrap_or("").to_string(),
        arena_capacity: row.str_or_number("ARENACAPACITY").unwrap_or_default(),
        owner: row.str("OWNER").unwrap_or("").to_string(),
        general_manager: row.str("GENERALMANAGER").unwrap_or("").to_string(),
        head_coach: row.str("HEADCOACH").unwrap_or("").to_string(),
        dleague_affiliation: row.str("DLEAGUEAFFILIATION").unwrap_or("").to_string(),
        team_slug: slug,
    })
}

/// Syncs franchise background details via batch fetch and, separately,
/// team logos from the image CDN.
#[derive(Debug)]
pub struct TeamSync {
    pool: SqlitePool,
    league_fetcher: LeagueFetcher,
    team_fetcher: TeamFetcher,
    http: Arc<HttpClient>,
    logo_base_url: String,
}

impl TeamSync {
    pub fn new(
        pool: SqlitePool,
        league_fetcher: LeagueFetcher,
        team_fetcher: TeamFetcher,
        http: Arc<HttpClient>,
    ) -> Self {
        TeamSync {
            pool,
            league_fetcher,
            team_fetcher,
            http,
            logo_base_url: constants::urls::LOGO_BASE.to_string(),
        }
    }

    /// Points logo downloads at a different CDN root (mirrors, tests).
    pub fn with_logo_base_url(mut self, base: String) -> Self {
        self.logo_base_url = base;
        self
    }

    async fn existing_count(&self) -> Result<u64, AppError> {
        let count: (i64,) = sqlx::query_as("SELECT count(*) FROM teams")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as u64)
    }

    /// Syncs all thirty franchises' details. Without `force`, an already
    /// populated table short-circuits.
    #[instrument(skip(self))]
    pub async fn sync_details(&self, force: bool) -> Result<SyncOutcome, AppError> {
        if !force {
            let existing = self.existing_count().await?;
            if existing > 0 {
                info!("Teams table already has {existing} rows, skipping sync");
                return Ok(SyncOutcome {
                    count: existing,
                    status: SyncStatus::Skipped,
                });
            }
        }

        let team_ids = self.league_fetcher.all_team_ids();
        info!("Syncing details for {} teams", team_ids.len());

        let outcome = self
            .team_fetcher
            .get_multiple_details(&team_ids, force, BatchOptions::default())
            .await?;

        let mut rows = Vec::new();
        for (key, payload) in &outcome.results {
            let team_id: i64 = key.parse().unwrap_or(0);
            match parse_team_details(payload, team_id) {
                Some(row) => rows.push(row),
                None => warn!("Team {key} has no TeamBackground data"),
            }
        }
        // Deterministic import order regardless of map iteration.
        rows.sort_by_key(|row| row.team_id);

        let count = self.import_teams(&rows).await?;
        info!("Synced {count}/{} team detail rows", team_ids.len());

        Ok(SyncOutcome {
            count,
            status: SyncStatus::Success,
        })
    }

    /// Upserts team rows in one transaction; failing rows are skipped.
    pub async fn import_teams(&self, rows: &[TeamRow]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().to_rfc3339();
        let mut success = 0u64;

        for row in rows {
            if row.team_id <= 0 {
                continue;
            }
            let result = sqlx::query(
                r#"
                INSERT INTO teams (
                    team_id, abbreviation, nickname, year_founded, city, arena,
                    arena_capacity, owner, general_manager, head_coach,
                    dleague_affiliation, team_slug, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(team_id) DO UPDATE SET
                    abbreviation = excluded.abbreviation,
                    nickname = excluded.nickname,
                    year_founded = excluded.year_founded,
                    city = excluded.city,
                    arena = excluded.arena,
                    arena_capacity = excluded.arena_capacity,
                    owner = excluded.owner,
                    general_manager = excluded.general_manager,
                    head_coach = excluded.head_coach,
                    dleague_affiliation = excluded.dleague_affiliation,
                    team_slug = excluded.team_slug,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(row.team_id)
            .bind(&row.abbreviation)
            .bind(&row.nickname)
            .bind(row.year_founded)
            .bind(&row.city)
            .bind(&row.arena)
            .bind(&row.arena_capacity)
            .bind(&row.owner)
            .bind(&row.general_manager)
            .bind(&row.head_coach)
            .bind(&row.dleague_affiliation)
            .bind(&row.team_slug)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => success += 1,
                Err(e) => error!("Upserting team {} failed: {e}", row.team_id),
            }
        }

        tx.commit().await?;
        info!("Saved {success}/{} team rows", rows.len());
        Ok(success)
    }

    /// Downloads each team's logo, trying SVG then PNG, and stores the
    /// bytes in `teams.logo`. Failures are per-team and non-fatal.
    #[instrument(skip(self))]
    pub async fn sync_logos(&self) -> Result<SyncOutcome, AppError> {
        let team_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT team_id FROM teams ORDER BY city, nickname")
                .fetch_all(&self.pool)
                .await?;

        let total = team_ids.len();
        let mut success = 0u64;

        for (i, (team_id,)) in team_ids.iter().enumerate() {
            debug!("Syncing logo {}/{total} for team {team_id}", i + 1);

            let candidates = [
                format!("{}/{team_id}/global/L/logo.svg", self.logo_base_url),
                format!("{}/{team_id}/global/L/logo.png", self.logo_base_url),
            ];

            for url in &candidates {
                match self.http.get_bytes(url).await {
                    Ok(bytes) if !bytes.is_empty() => {
                        match sqlx::query("UPDATE teams SET logo = ? WHERE team_id = ?")
                            .bind(bytes.as_ref())
                            .bind(team_id)
                            .execute(&self.pool)
                            .await
                        {
                            Ok(_) => {
                                info!("Stored logo for team {team_id} ({} bytes)", bytes.len());
                                success += 1;
                            }
                            Err(e) => error!("Storing logo for team {team_id} failed: {e}"),
                        }
                        break;
                    }
                    Ok(_) => debug!("Empty logo payload from {url}"),
                    Err(e) => debug!("Logo fetch from {url} failed: {e}"),
                }
            }
        }

        info!("Synced logos for {success}/{total} teams");
        Ok(SyncOutcome {
            count: success,
            status: SyncStatus::Success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details_payload(team_id: i64, slug: Option<&str>) -> Value {
        json!({
            "resource": "teamdetails",
            "resultSets": [{
                "name": "TeamBackground",
                "headers": [
                    "TEAM_ID", "ABBREVIATION", "NICKNAME", "YEARFOUNDED", "CITY",
                    "ARENA", "ARENACAPACITY", "OWNER", "GENERALMANAGER", "HEADCOACH",
                    "DLEAGUEAFFILIATION", "TEAM_SLUG"
                ],
                "rowSet": [[
                    team_id, "LAL", "Lakers", 1948, "Los Angeles",
                    "Crypto.com Arena", "19079", "Jeanie Buss", "Rob Pelinka", "JJ Redick",
                    "South Bay Lakers", slug.unwrap_or("")
                ]]
            }]
        })
    }

    #[test]
    fn test_parse_team_details_full_row() {
        let row = parse_team_details(&details_payload(1610612747, Some("lakers")), 1610612747)
            .unwrap();
        assert_eq!(row.team_id, 1610612747);
        assert_eq!(row.abbreviation, "LAL");
        assert_eq!(row.nickname, "Lakers");
        assert_eq!(row.year_founded, 1948);
        assert_eq!(row.arena_capacity, "19079");
        assert_eq!(row.team_slug, "lakers");
    }

    #[test]
    fn test_slug_generated_from_nickname_when_absent() {
        let row = parse_team_details(&details_payload(1610612747, None), 1610612747).unwrap();
        assert_eq!(row.team_slug, "lakers");
    }

    #[test]
    fn test_parse_rejects_payload_without_background() {
        let payload = json!({"resultSets": [{"name": "Other", "headers": [], "rowSet": []}]});
        assert!(parse_team_details(&payload, 1).is_none());
    }
}
