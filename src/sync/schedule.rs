//! Schedule synchronizer: season schedule payloads into the `games` table

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument, warn};

use crate::error::AppError;
use crate::fetcher::schedule::ScheduleFetcher;

use super::{SyncOutcome, SyncStatus};

/// Beijing is UTC+8 year-round.
const BEIJING_OFFSET_SECONDS: i32 = 8 * 3600;

/// Classifies a game from its free-form series text. The ruleset is
/// ordered: the first matching pattern wins, and playoff series states
/// ("leads", "tied", "won") count as Playoffs.
pub fn classify_game_type(series_text: &str) -> &'static str {
    if series_text.contains("Preseason") {
        "Preseason"
    } else if series_text.contains("Play-In") {
        "Play-In"
    } else if series_text.contains("All-Star") {
        "All-Star"
    } else if series_text.contains("Playoffs")
        || ["leads", "tied", "won"].iter().any(|s| series_text.contains(s))
    {
        "Playoffs"
    } else {
        "Regular Season"
    }
}

/// Renders a UTC game timestamp in Beijing local time: the full RFC 3339
/// instant plus its date and time-of-day parts.
pub fn beijing_times(game_date_time_utc: &str) -> Option<(String, String, String)> {
    let parsed = DateTime::parse_from_rfc3339(game_date_time_utc).ok()?;
    let offset = FixedOffset::east_opt(BEIJING_OFFSET_SECONDS)?;
    let beijing = parsed.with_timezone(&offset);
    Some((
        beijing.to_rfc3339(),
        beijing.format("%Y-%m-%d").to_string(),
        beijing.format("%H:%M:%S").to_string(),
    ))
}

/// One parsed game row, shaped for the `games` table.
#[derive(Debug, Clone, Default)]
pub struct GameRow {
    pub game_id: String,
    pub game_code: String,
    pub game_status: i64,
    pub game_status_text: String,
    pub game_date_est: String,
    pub game_time_est: String,
    pub game_date_time_est: String,
    pub game_date_utc: String,
    pub game_time_utc: String,
    pub game_date_time_utc: String,
    pub game_date: String,
    pub season_year: String,
    pub week_number: i64,
    pub week_name: String,
    pub series_game_number: String,
    pub if_necessary: String,
    pub series_text: String,
    pub arena_name: String,
    pub arena_city: String,
    pub arena_state: String,
    pub arena_is_neutral: bool,
    pub home_team: TeamSnapshot,
    pub away_team: TeamSnapshot,
    pub points_leader_id: i64,
    pub points_leader_first_name: String,
    pub points_leader_last_name: String,
    pub points_leader_team_id: i64,
    pub points_leader_points: f64,
    pub game_type: String,
    pub game_sub_type: String,
    pub game_label: String,
    pub game_sub_label: String,
    pub postponed_status: String,
    pub game_date_bjs: Option<String>,
    pub game_time_bjs: Option<String>,
    pub game_date_time_bjs: Option<String>,
}

/// Per-team snapshot embedded in the game row. Held by value, not by
/// reference: schedule data arrives before team details during bootstrap.
#[derive(Debug, Clone, Default)]
pub struct TeamSnapshot {
    pub team_id: i64,
    pub team_name: String,
    pub team_city: String,
    pub team_tricode: String,
    pub team_slug: String,
    pub team_wins: i64,
    pub team_losses: i64,
    pub team_score: i64,
    pub team_seed: i64,
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

fn i64_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn team_snapshot(team: &Value) -> TeamSnapshot {
    TeamSnapshot {
        team_id: i64_field(team, "teamId"),
        team_name: str_field(team, "teamName"),
        team_city: str_field(team, "teamCity"),
        team_tricode: str_field(team, "teamTricode"),
        team_slug: str_field(team, "teamSlug"),
        team_wins: i64_field(team, "wins"),
        team_losses: i64_field(team, "losses"),
        team_score: i64_field(team, "score"),
        team_seed: i64_field(team, "seed"),
    }
}

/// Parses `leagueSchedule.gameDates[].games[]` into rows, preserving the
/// payload's array order.
pub fn parse_schedule(payload: &Value) -> Result<Vec<GameRow>, AppError> {
    let Some(league_schedule) = payload.get("leagueSchedule") else {
        return Err(AppError::api_unexpected_structure(
            "payload has no leagueSchedule",
            "scheduleleaguev2",
        ));
    };

    let season_year = str_field(league_schedule, "seasonYear");
    let empty = Vec::new();
    let game_dates = league_schedule
        .get("gameDates")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut rows = Vec::new();
    for game_date in game_dates {
        let games = game_date.get("games").and_then(Value::as_array).unwrap_or(&empty);
        for game in games {
            let game_date_est = str_field(game, "gameDateEst");
            let game_date_time_utc = str_field(game, "gameDateTimeUTC");

            // Calendar date: the EST timestamp's date part, falling back to
            // the raw string's first token.
            let game_date_str = if game_date_est.is_empty() {
                String::new()
            } else {
                DateTime::parse_from_rfc3339(&game_date_est)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|_| {
                        game_date_est
                            .split_whitespace()
                            .next()
                            .unwrap_or("")
                            .to_string()
                    })
            };

            let series_text = str_field(game, "seriesText");
            let game_type = classify_game_type(&series_text).to_string();

            let (bjs_datetime, bjs_date, bjs_time) = if game_date_time_utc.is_empty() {
                (None, None, None)
            } else {
                match beijing_times(&game_date_time_utc) {
                    Some((dt, d, t)) => (Some(dt), Some(d), Some(t)),
                    None => {
                        warn!("Unparseable UTC timestamp '{game_date_time_utc}', skipping Beijing derivation");
                        (None, None, None)
                    }
                }
            };

            let points_leader = game
                .get("pointsLeaders")
                .and_then(Value::as_array)
                .and_then(|leaders| leaders.first())
                .cloned()
                .unwrap_or(Value::Null);

            rows.push(GameRow {
                game_id: str_field(game, "gameId"),
                game_code: str_field(game, "gameCode"),
                game_status: i64_field(game, "gameStatus"),
                game_status_text: str_field(game, "gameStatusText"),
                game_date_est,
                game_time_est: str_field(game, "gameTimeEst"),
                game_date_time_est: str_field(game, "gameDateTimeEst"),
                game_date_utc: str_field(game, "gameDateUTC"),
                game_time_utc: str_field(game, "gameTimeUTC"),
                game_date_time_utc,
                game_date: game_date_str,
                season_year: season_year.clone(),
                week_number: i64_field(game, "weekNumber"),
                week_name: str_field(game, "weekName"),
                series_game_number: str_field(game, "seriesGameNumber"),
                if_necessary: match game.get("ifNecessary") {
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(Value::String(s)) => s.clone(),
                    _ => "false".to_string(),
                },
                series_text,
                arena_name: str_field(game, "arenaName"),
                arena_city: str_field(game, "arenaCity"),
                arena_state: str_field(game, "arenaState"),
                arena_is_neutral: game
                    .get("isNeutral")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                home_team: team_snapshot(game.get("homeTeam").unwrap_or(&Value::Null)),
                away_team: team_snapshot(game.get("awayTeam").unwrap_or(&Value::Null)),
                points_leader_id: i64_field(&points_leader, "personId"),
                points_leader_first_name: str_field(&points_leader, "firstName"),
                points_leader_last_name: str_field(&points_leader, "lastName"),
                points_leader_team_id: i64_field(&points_leader, "teamId"),
                points_leader_points: points_leader
                    .get("points")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                game_type,
                game_sub_type: str_field(game, "gameSubtype"),
                game_label: str_field(game, "gameLabel"),
                game_sub_label: str_field(game, "gameSubLabel"),
                postponed_status: str_field(game, "postponedStatus"),
                game_date_bjs: bjs_date,
                game_time_bjs: bjs_time,
                game_date_time_bjs: bjs_datetime,
            });
        }
    }

    info!("Parsed {} games from schedule payload", rows.len());
    Ok(rows)
}

/// Syncs season schedules into the `games` table. Upserts are idempotent:
/// a repeated run with the same payload only touches `updated_at`.
#[derive(Debug)]
pub struct ScheduleSync {
    pool: SqlitePool,
    fetcher: ScheduleFetcher,
}

impl ScheduleSync {
    pub fn new(pool: SqlitePool, fetcher: ScheduleFetcher) -> Self {
        ScheduleSync { pool, fetcher }
    }

    pub async fn existing_count(&self, season: &str) -> Result<u64, AppError> {
        let count: (i64,) =
            sqlx::query_as("SELECT count(*) FROM games WHERE season_year = ?")
                .bind(season)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 as u64)
    }

    /// Syncs one season. Without `force`, a season that already has rows is
    /// skipped and its existing count reported.
    #[instrument(skip(self))]
    pub async fn sync_season(&self, season: &str, force: bool) -> Result<SyncOutcome, AppError> {
        if !force {
            let existing = self.existing_count(season).await?;
            if existing > 0 {
                info!("Season {season} already has {existing} games, skipping sync");
                return Ok(SyncOutcome {
                    count: existing,
                    status: SyncStatus::Skipped,
                });
            }
        }

        let payload = self.fetcher.get_by_season(season, force).await?;
        let rows = parse_schedule(&payload)?;
        let count = self.import_games(&rows).await?;
        info!("Season {season}: synced {count} games");

        Ok(SyncOutcome {
            count,
            status: SyncStatus::Success,
        })
    }

    /// Syncs the configured current season, force-refreshing by default.
    pub async fn sync_current_season(&self, force: bool) -> Result<SyncOutcome, AppError> {
        let season = self.fetcher.current_season().to_string();
        info!("Syncing current season {season}");
        self.sync_season(&season, force).await
    }

    /// Sweeps every season from the configured start, optionally resuming
    /// from a given season. Seasons already present are skipped unless
    /// forced; failures are recorded per season and do not stop the sweep.
    pub async fn sync_all_seasons(
        &self,
        start_from: Option<&str>,
        force: bool,
    ) -> Result<HashMap<String, u64>, AppError> {
        let mut seasons = self.fetcher.all_seasons()?;
        if let Some(start) = start_from {
            match seasons.iter().position(|s| s == start) {
                Some(index) => seasons = seasons.split_off(index),
                None => {
                    error!("Unknown start season {start}");
                    return Err(AppError::config_error(format!(
                        "unknown start season {start}"
                    )));
                }
            }
        }

        let mut results = HashMap::new();

        if !force {
            let mut pending = Vec::new();
            for season in seasons {
                let existing = self.existing_count(&season).await?;
                if existing > 0 {
                    debug!("Season {season} already synced ({existing} games)");
                    results.insert(season, existing);
                } else {
                    pending.push(season);
                }
            }
            seasons = pending;
            if seasons.is_empty() {
                info!("All seasons already synced");
                return Ok(results);
            }
        }

        info!("Sweeping {} seasons", seasons.len());
        let payloads = self.fetcher.get_for_seasons(&seasons, force).await;

        for (i, season) in seasons.iter().enumerate() {
            info!("Processing season {season} ({}/{})", i + 1, seasons.len());
            let Some(payload) = payloads.get(season) else {
                warn!("No payload fetched for season {season}");
                results.insert(season.clone(), 0);
                continue;
            };
            match parse_schedule(payload) {
                Ok(rows) => match self.import_games(&rows).await {
                    Ok(count) => {
                        results.insert(season.clone(), count);
                    }
                    Err(e) => {
                        error!("Importing season {season} failed: {e}");
                        results.insert(season.clone(), 0);
                    }
                },
                Err(e) => {
                    error!("Parsing season {season} failed: {e}");
                    results.insert(season.clone(), 0);
                }
            }
        }

        Ok(results)
    }

    /// Upserts rows in one transaction. A failing row is logged and
    /// skipped; the transaction still commits the rest.
    pub async fn import_games(&self, rows: &[GameRow]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let mut success = 0u64;

        for row in rows {
            if row.game_id.is_empty() {
                warn!("Skipping game row without a game_id");
                continue;
            }

            let result = sqlx::query(UPSERT_GAME)
                .bind(&row.game_id)
                .bind(&row.game_code)
                .bind(row.game_status)
                .bind(&row.game_status_text)
                .bind(&row.game_date_est)
                .bind(&row.game_time_est)
                .bind(&row.game_date_time_est)
                .bind(&row.game_date_utc)
                .bind(&row.game_time_utc)
                .bind(&row.game_date_time_utc)
                .bind(&row.game_date)
                .bind(&row.season_year)
                .bind(row.week_number)
                .bind(&row.week_name)
                .bind(&row.series_game_number)
                .bind(&row.if_necessary)
                .bind(&row.series_text)
                .bind(&row.arena_name)
                .bind(&row.arena_city)
                .bind(&row.arena_state)
                .bind(row.arena_is_neutral)
                .bind(row.home_team.team_id)
                .bind(&row.home_team.team_name)
                .bind(&row.home_team.team_city)
                .bind(&row.home_team.team_tricode)
                .bind(&row.home_team.team_slug)
                .bind(row.home_team.team_wins)
                .bind(row.home_team.team_losses)
                .bind(row.home_team.team_score)
                .bind(row.home_team.team_seed)
                .bind(row.away_team.team_id)
                .bind(&row.away_team.team_name)
                .bind(&row.away_team.team_city)
                .bind(&row.away_team.team_tricode)
                .bind(&row.away_team.team_slug)
                .bind(row.away_team.team_wins)
                .bind(row.away_team.team_losses)
                .bind(row.away_team.team_score)
                .bind(row.away_team.team_seed)
                .bind(row.points_leader_id)
                .bind(&row.points_leader_first_name)
                .bind(&row.points_leader_last_name)
                .bind(row.points_leader_team_id)
                .bind(row.points_leader_points)
                .bind(&row.game_type)
                .bind(&row.game_sub_type)
                .bind(&row.game_label)
                .bind(&row.game_sub_label)
                .bind(&row.postponed_status)
                .bind(&row.game_date_bjs)
                .bind(&row.game_time_bjs)
                .bind(&row.game_date_time_bjs)
                .bind(&now)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(_) => success += 1,
                Err(e) => error!("Upserting game {} failed: {e}", row.game_id),
            }
        }

        tx.commit().await?;
        info!("Saved {success}/{} game rows", rows.len());
        Ok(success)
    }
}

const UPSERT_GAME: &str = r#"
INSERT INTO games (
    game_id, game_code, game_status, game_status_text,
    game_date_est, game_time_est, game_date_time_est,
    game_date_utc, game_time_utc, game_date_time_utc,
    game_date, season_year, week_number, week_name,
    series_game_number, if_necessary, series_text,
    arena_name, arena_city, arena_state, arena_is_neutral,
    home_team_id, home_team_name, home_team_city, home_team_tricode,
    home_team_slug, home_team_wins, home_team_losses, home_team_score, home_team_seed,
    away_team_id, away_team_name, away_team_city, away_team_tricode,
    away_team_slug, away_team_wins, away_team_losses, away_team_score, away_team_seed,
    points_leader_id, points_leader_first_name, points_leader_last_name,
    points_leader_team_id, points_leader_points,
    game_type, game_sub_type, game_label, game_sub_label, postponed_status,
    game_date_bjs, game_time_bjs, game_date_time_bjs, updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(game_id) DO UPDATE SET
    game_code = excluded.game_code,
    game_status = excluded.game_status,
    game_status_text = excluded.game_status_text,
    game_date_est = excluded.game_date_est,
    game_time_est = excluded.game_time_est,
    game_date_time_est = excluded.game_date_time_est,
    game_date_utc = excluded.game_date_utc,
    game_time_utc = excluded.game_time_utc,
    game_date_time_utc = excluded.game_date_time_utc,
    game_date = excluded.game_date,
    season_year = excluded.season_year,
    week_number = excluded.week_number,
    week_name = excluded.week_name,
    series_game_number = excluded.series_game_number,
    if_necessary = excluded.if_necessary,
    series_text = excluded.series_text,
    arena_name = excluded.arena_name,
    arena_city = excluded.arena_city,
    arena_state = excluded.arena_state,
    arena_is_neutral = excluded.arena_is_neutral,
    home_team_id = excluded.home_team_id,
    home_team_name = excluded.home_team_name,
    home_team_city = excluded.home_team_city,
    home_team_tricode = excluded.home_team_tricode,
    home_team_slug = excluded.home_team_slug,
    home_team_wins = excluded.home_team_wins,
    home_team_losses = excluded.home_team_losses,
    home_team_score = excluded.home_team_score,
    home_team_seed = excluded.home_team_seed,
    away_team_id = excluded.away_team_id,
    away_team_name = excluded.away_team_name,
    away_team_city = excluded.away_team_city,
    away_team_tricode = excluded.away_team_tricode,
    away_team_slug = excluded.away_team_slug,
    away_team_wins = excluded.away_team_wins,
    away_team_losses = excluded.away_team_losses,
    away_team_score = excluded.away_team_score,
    away_team_seed = excluded.away_team_seed,
    points_leader_id = excluded.points_leader_id,
    points_leader_first_name = excluded.points_leader_first_name,
    points_leader_last_name = excluded.points_leader_last_name,
    points_leader_team_id = excluded.points_leader_team_id,
    points_leader_points = excluded.points_leader_points,
    game_type = excluded.game_type,
    game_sub_type = excluded.game_sub_type,
    game_label = excluded.game_label,
    game_sub_label = excluded.game_sub_label,
    postponed_status = excluded.postponed_status,
    game_date_bjs = excluded.game_date_bjs,
    game_time_bjs = excluded.game_time_bjs,
    game_date_time_bjs = excluded.game_date_time_bjs,
    updated_at = excluded.updated_at
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_game_type_classification_order() {
        assert_eq!(classify_game_type("Preseason"), "Preseason");
        assert_eq!(classify_game_type("NBA Play-In Tournament"), "Play-In");
        assert_eq!(classify_game_type("All-Star Weekend"), "All-Star");
        assert_eq!(classify_game_type("Lakers leads 2-0"), "Playoffs");
        assert_eq!(classify_game_type("Series tied 1-1"), "Playoffs");
        assert_eq!(classify_game_type("Celtics won 4-2"), "Playoffs");
        assert_eq!(classify_game_type("East Playoffs Rd 1"), "Playoffs");
        assert_eq!(classify_game_type(""), "Regular Season");
        assert_eq!(classify_game_type("Emirates NBA Cup"), "Regular Season");
    }

    #[test]
    fn test_beijing_derivation() {
        let (datetime, date, time) = beijing_times("2024-12-25T20:00:00Z").unwrap();
        assert_eq!(datetime, "2024-12-26T04:00:00+08:00");
        assert_eq!(date, "2024-12-26");
        assert_eq!(time, "04:00:00");
    }

    #[test]
    fn test_beijing_derivation_preserves_instant() {
        let (datetime, _, _) = beijing_times("2024-03-01T15:30:00Z").unwrap();
        let round_tripped = DateTime::parse_from_rfc3339(&datetime).unwrap();
        let original = DateTime::parse_from_rfc3339("2024-03-01T15:30:00Z").unwrap();
        assert_eq!(round_tripped.timestamp(), original.timestamp());
    }

    #[test]
    fn test_beijing_derivation_rejects_garbage() {
        assert!(beijing_times("not-a-date").is_none());
        assert!(beijing_times("").is_none());
    }

    fn sample_payload() -> Value {
        json!({
            "leagueSchedule": {
                "seasonYear": "2024-25",
                "gameDates": [
                    {
                        "gameDate": "12/25/2024 00:00:00",
                        "games": [
                            {
                                "gameId": "0022400408",
                                "gameCode": "20241225/GSWLAL",
                                "gameStatus": 3,
                                "gameStatusText": "Final",
                                "gameDateEst": "2024-12-25T00:00:00Z",
                                "gameTimeEst": "1900-01-01T15:00:00Z",
                                "gameDateTimeEst": "2024-12-25T15:00:00Z",
                                "gameDateUTC": "2024-12-25T00:00:00Z",
                                "gameTimeUTC": "1900-01-01T20:00:00Z",
                                "gameDateTimeUTC": "2024-12-25T20:00:00Z",
                                "weekNumber": 10,
                                "weekName": "Week 10",
                                "seriesGameNumber": "",
                                "ifNecessary": false,
                                "seriesText": "",
                                "arenaName": "Crypto.com Arena",
                                "arenaCity": "Los Angeles",
                                "arenaState": "CA",
                                "isNeutral": false,
                                "gameSubtype": "",
                                "gameLabel": "",
                                "gameSubLabel": "",
                                "postponedStatus": "",
                                "homeTeam": {
                                    "teamId": 1610612747,
                                    "teamName": "Lakers",
                                    "teamCity": "Los Angeles",
                                    "teamTricode": "LAL",
                                    "teamSlug": "lakers",
                                    "wins": 17,
                                    "losses": 13,
                                    "score": 115,
                                    "seed": 0
                                },
                                "awayTeam": {
                                    "teamId": 1610612744,
                                    "teamName": "Warriors",
                                    "teamCity": "Golden State",
                                    "teamTricode": "GSW",
                                    "teamSlug": "warriors",
                                    "wins": 15,
                                    "losses": 14,
                                    "score": 105,
                                    "seed": 0
                                },
                                "pointsLeaders": [
                                    {
                                        "personId": 2544,
                                        "firstName": "LeBron",
                                        "lastName": "James",
                                        "teamId": 1610612747,
                                        "points": 31.0
                                    }
                                ]
                            }
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn test_parse_schedule_extracts_full_row() {
        let rows = parse_schedule(&sample_payload()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.game_id, "0022400408");
        assert_eq!(row.season_year, "2024-25");
        assert_eq!(row.game_date, "2024-12-25");
        assert_eq!(row.game_type, "Regular Season");
        assert_eq!(row.home_team.team_tricode, "LAL");
        assert_eq!(row.home_team.team_score, 115);
        assert_eq!(row.away_team.team_id, 1610612744);
        assert_eq!(row.points_leader_first_name, "LeBron");
        assert!((row.points_leader_points - 31.0).abs() < f64::EPSILON);
        assert_eq!(row.game_date_bjs.as_deref(), Some("2024-12-26"));
        assert_eq!(row.game_time_bjs.as_deref(), Some("04:00:00"));
        assert_eq!(
            row.game_date_time_bjs.as_deref(),
            Some("2024-12-26T04:00:00+08:00")
        );
    }

    #[test]
    fn test_parse_schedule_rejects_missing_league_schedule() {
        assert!(parse_schedule(&json!({"foo": 1})).is_err());
    }

    #[test]
    fn test_parse_schedule_tolerates_missing_leaders() {
        let mut payload = sample_payload();
        payload["leagueSchedule"]["gameDates"][0]["games"][0]["pointsLeaders"] = json!([]);
        let rows = parse_schedule(&payload).unwrap();
        assert_eq!(rows[0].points_leader_id, 0);
        assert_eq!(rows[0].points_leader_first_name, "");
    }
}
