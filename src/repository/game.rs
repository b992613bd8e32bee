//! Game lookups: per-team date queries and ranged listings

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;

/// Date selector for [`GameRepository::game_id_for_team`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateQuery {
    Today,
    Next,
    Last,
    On(NaiveDate),
}

impl FromStr for DateQuery {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "today" => Ok(DateQuery::Today),
            "next" => Ok(DateQuery::Next),
            "last" => Ok(DateQuery::Last),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(DateQuery::On)
                .map_err(|_| {
                    AppError::datetime_parse_error(format!(
                        "date query must be today/next/last or YYYY-MM-DD, got '{other}'"
                    ))
                }),
        }
    }
}

/// Flat projection of a game row for downstream consumers.
#[derive(Debug, Clone, FromRow)]
pub struct GameSummary {
    pub game_id: String,
    pub game_date: String,
    pub game_date_time_utc: String,
    pub season_year: String,
    pub game_status: i64,
    pub game_type: String,
    pub home_team_id: i64,
    pub home_team_name: String,
    pub home_team_tricode: String,
    pub home_team_score: i64,
    pub away_team_id: i64,
    pub away_team_name: String,
    pub away_team_tricode: String,
    pub away_team_score: i64,
}

const SUMMARY_COLUMNS: &str = "game_id, game_date, game_date_time_utc, season_year, \
     game_status, game_type, home_team_id, home_team_name, home_team_tricode, \
     home_team_score, away_team_id, away_team_name, away_team_tricode, away_team_score";

/// Read-only queries over the `games` table. All date/time comparisons run
/// against `game_date_time_utc`, whose stored RFC 3339 Z-form compares
/// lexicographically.
#[derive(Debug, Clone)]
pub struct GameRepository {
    pool: SqlitePool,
}

impl GameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GameRepository { pool }
    }

    /// Resolves at most one game id for a team and date query.
    pub async fn game_id_for_team(
        &self,
        team_id: i64,
        query: DateQuery,
    ) -> Result<Option<String>, AppError> {
        self.game_id_for_team_at(team_id, query, Utc::now()).await
    }

    /// Same as [`Self::game_id_for_team`] with an explicit reference time.
    pub async fn game_id_for_team_at(
        &self,
        team_id: i64,
        query: DateQuery,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let now_str = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let row: Option<(String,)> = match query {
            DateQuery::Today => {
                let today = now.format("%Y-%m-%d").to_string();
                sqlx::query_as(
                    "SELECT game_id FROM games \
                     WHERE (home_team_id = ? OR away_team_id = ?) \
                       AND substr(game_date_time_utc, 1, 10) = ? \
                     ORDER BY game_date_time_utc LIMIT 1",
                )
                .bind(team_id)
                .bind(team_id)
                .bind(today)
                .fetch_optional(&self.pool)
                .await?
            }
            DateQuery::Next => {
                sqlx::query_as(
                    "SELECT game_id FROM games \
                     WHERE (home_team_id = ? OR away_team_id = ?) \
                       AND game_date_time_utc > ? \
                     ORDER BY game_date_time_utc ASC LIMIT 1",
                )
                .bind(team_id)
                .bind(team_id)
                .bind(&now_str)
                .fetch_optional(&self.pool)
                .await?
            }
            DateQuery::Last => {
                sqlx::query_as(
                    "SELECT game_id FROM games \
                     WHERE (home_team_id = ? OR away_team_id = ?) \
                       AND game_date_time_utc < ? \
                     ORDER BY game_date_time_utc DESC LIMIT 1",
                )
                .bind(team_id)
                .bind(team_id)
                .bind(&now_str)
                .fetch_optional(&self.pool)
                .await?
            }
            DateQuery::On(date) => {
                sqlx::query_as(
                    "SELECT game_id FROM games \
                     WHERE (home_team_id = ? OR away_team_id = ?) \
                       AND substr(game_date_time_utc, 1, 10) = ? \
                     ORDER BY game_date_time_utc LIMIT 1",
                )
                .bind(team_id)
                .bind(team_id)
                .bind(date.format("%Y-%m-%d").to_string())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row.map(|(game_id,)| game_id))
    }

    /// All games on a UTC calendar date, in tip-off order.
    pub async fn games_by_date(&self, date: NaiveDate) -> Result<Vec<GameSummary>, AppError> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM games \
             WHERE substr(game_date_time_utc, 1, 10) = ? \
             ORDER BY game_date_time_utc"
        );
        let games = sqlx::query_as::<_, GameSummary>(&sql)
            .bind(date.format("%Y-%m-%d").to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(games)
    }

    /// A team's most recent games, newest first.
    pub async fn games_by_team(
        &self,
        team_id: i64,
        limit: i64,
    ) -> Result<Vec<GameSummary>, AppError> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM games \
             WHERE home_team_id = ? OR away_team_id = ? \
             ORDER BY game_date_time_utc DESC LIMIT ?"
        );
        let games = sqlx::query_as::<_, GameSummary>(&sql)
            .bind(team_id)
            .bind(team_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const LAL: i64 = 1610612747;
    const GSW: i64 = 1610612744;
    const BOS: i64 = 1610612738;

    async fn seeded_pool() -> SqlitePool {
        let pool = db::create_memory_pool().await.unwrap();
        db::init_schema(&pool).await.unwrap();

        let games = [
            ("0022400100", "2024-12-20T03:00:00Z", LAL, GSW),
            ("0022400408", "2024-12-25T20:00:00Z", LAL, GSW),
            ("0022400409", "2024-12-25T22:30:00Z", BOS, GSW),
            ("0022400500", "2024-12-28T01:00:00Z", GSW, LAL),
        ];
        for (game_id, utc, home, away) in games {
            sqlx::query(
                "INSERT INTO games (game_id, game_date, game_date_time_utc, season_year, \
                 game_status, game_type, home_team_id, home_team_name, home_team_tricode, \
                 home_team_score, away_team_id, away_team_name, away_team_tricode, away_team_score) \
                 VALUES (?, substr(?, 1, 10), ?, '2024-25', 1, 'Regular Season', ?, 'H', 'HHH', 0, ?, 'A', 'AAA', 0)",
            )
            .bind(game_id)
            .bind(utc)
            .bind(utc)
            .bind(home)
            .bind(away)
            .execute(&pool)
            .await
            .unwrap();
        }
        pool
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_date_query_parsing() {
        assert_eq!(DateQuery::from_str("today").unwrap(), DateQuery::Today);
        assert_eq!(DateQuery::from_str("NEXT").unwrap(), DateQuery::Next);
        assert_eq!(DateQuery::from_str("last").unwrap(), DateQuery::Last);
        assert_eq!(
            DateQuery::from_str("2024-12-25").unwrap(),
            DateQuery::On(NaiveDate::from_ymd_opt(2024, 12, 25).unwrap())
        );
        assert!(DateQuery::from_str("someday").is_err());
    }

    #[tokio::test]
    async fn test_today_query() {
        let repo = GameRepository::new(seeded_pool().await);
        let now = at("2024-12-25T12:00:00Z");
        assert_eq!(
            repo.game_id_for_team_at(LAL, DateQuery::Today, now).await.unwrap(),
            Some("0022400408".to_string())
        );
        assert_eq!(
            repo.game_id_for_team_at(BOS, DateQuery::Today, now).await.unwrap(),
            Some("0022400409".to_string())
        );
    }

    #[tokio::test]
    async fn test_next_and_last_queries() {
        let repo = GameRepository::new(seeded_pool().await);
        let now = at("2024-12-26T00:00:00Z");
        assert_eq!(
            repo.game_id_for_team_at(LAL, DateQuery::Next, now).await.unwrap(),
            Some("0022400500".to_string())
        );
        assert_eq!(
            repo.game_id_for_team_at(LAL, DateQuery::Last, now).await.unwrap(),
            Some("0022400408".to_string())
        );

        // No future games after the season's final fixture.
        let late = at("2025-07-01T00:00:00Z");
        assert_eq!(
            repo.game_id_for_team_at(LAL, DateQuery::Next, late).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_explicit_date_query() {
        let repo = GameRepository::new(seeded_pool().await);
        let date = DateQuery::On(NaiveDate::from_ymd_opt(2024, 12, 20).unwrap());
        assert_eq!(
            repo.game_id_for_team_at(LAL, date, Utc::now()).await.unwrap(),
            Some("0022400100".to_string())
        );
    }

    #[tokio::test]
    async fn test_games_by_date_ordered() {
        let repo = GameRepository::new(seeded_pool().await);
        let games = repo
            .games_by_date(NaiveDate::from_ymd_opt(2024, 12, 25).unwrap())
            .await
            .unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].game_id, "0022400408");
        assert_eq!(games[1].game_id, "0022400409");
    }

    #[tokio::test]
    async fn test_games_by_team_with_limit() {
        let repo = GameRepository::new(seeded_pool().await);
        let games = repo.games_by_team(GSW, 2).await.unwrap();
        assert_eq!(games.len(), 2);
        // Newest first.
        assert_eq!(games[0].game_id, "0022400500");
        assert_eq!(games[1].game_id, "0022400409");
    }
}
