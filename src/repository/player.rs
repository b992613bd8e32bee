//! Player lookups by name and id

use std::collections::HashSet;

use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::AppError;

use super::matching::token_sort_ratio;

/// Minimum fuzzy score for a player-name match.
const PLAYER_FUZZY_THRESHOLD: f64 = 50.0;

/// Which rendering of a player's name to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerNameForm {
    /// "LeBron James"
    Full,
    /// "James, LeBron"
    LastFirst,
    /// "LeBron"
    First,
    /// "James"
    Last,
}

/// Read-only queries over the `players` table.
#[derive(Debug, Clone)]
pub struct PlayerRepository {
    pool: SqlitePool,
}

impl PlayerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PlayerRepository { pool }
    }

    /// Resolves a player id from a (possibly partial) name. Containment
    /// over `display_first_last` wins when unambiguous; ambiguous or empty
    /// containment falls back to the best token-sort fuzzy match.
    pub async fn player_id_by_name(&self, name: &str) -> Result<Option<i64>, AppError> {
        let query = name.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let matches = sqlx::query(
            "SELECT person_id, display_first_last FROM players WHERE display_first_last LIKE ?",
        )
        .bind(format!("%{query}%"))
        .fetch_all(&self.pool)
        .await?;

        if matches.len() == 1 {
            return Ok(Some(matches[0].get("person_id")));
        }

        if matches.len() > 1 {
            let ids: HashSet<i64> = matches.iter().map(|row| row.get("person_id")).collect();
            if ids.len() == 1 {
                return Ok(ids.into_iter().next());
            }
            // Several distinct players contain the query; rank them.
            return Ok(best_fuzzy(query, &matches));
        }

        // No containment hit at all; rank the whole roster.
        let all = sqlx::query("SELECT person_id, display_first_last FROM players")
            .fetch_all(&self.pool)
            .await?;
        Ok(best_fuzzy(query, &all))
    }

    /// Renders a player's name in the requested form.
    pub async fn player_name_by_id(
        &self,
        player_id: i64,
        form: PlayerNameForm,
    ) -> Result<Option<String>, AppError> {
        let row = sqlx::query(
            "SELECT display_first_last, display_last_comma_first FROM players WHERE person_id = ?",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let first_last: String = row
            .get::<Option<String>, _>("display_first_last")
            .unwrap_or_default();
        let last_first: String = row
            .get::<Option<String>, _>("display_last_comma_first")
            .unwrap_or_default();

        let name = match form {
            PlayerNameForm::Full => first_last,
            PlayerNameForm::LastFirst => last_first,
            PlayerNameForm::First => split_last_first(&last_first)
                .map(|(_, first)| first)
                .or_else(|| first_last.split_whitespace().next().map(str::to_string))
                .unwrap_or_default(),
            PlayerNameForm::Last => split_last_first(&last_first)
                .map(|(last, _)| last)
                .or_else(|| {
                    first_last
                        .split_whitespace()
                        .last()
                        .map(str::to_string)
                })
                .unwrap_or_default(),
        };

        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }
}

fn split_last_first(last_comma_first: &str) -> Option<(String, String)> {
    let (last, first) = last_comma_first.split_once(',')?;
    Some((last.trim().to_string(), first.trim().to_string()))
}

fn best_fuzzy(query: &str, rows: &[sqlx::sqlite::SqliteRow]) -> Option<i64> {
    let mut best: Option<(f64, i64)> = None;
    for row in rows {
        let name: String = row
            .get::<Option<String>, _>("display_first_last")
            .unwrap_or_default();
        let score = token_sort_ratio(query, &name);
        if score >= PLAYER_FUZZY_THRESHOLD
            && best.is_none_or(|(best_score, _)| score > best_score)
        {
            best = Some((score, row.get("person_id")));
        }
    }
    if let Some((score, id)) = best {
        debug!("Fuzzy-matched player '{query}' to {id} (score {score:.1})");
    }
    best.map(|(_, id)| id)
}
