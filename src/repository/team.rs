//! Team lookups by name and id

use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::AppError;

use super::matching::partial_token_sort_ratio;

/// Minimum fuzzy score for a team-name match.
const TEAM_FUZZY_THRESHOLD: f64 = 70.0;

/// Which rendering of a team's name to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamNameForm {
    /// "Los Angeles Lakers"
    Full,
    /// "Lakers"
    Nickname,
    /// "Los Angeles"
    City,
    /// "LAL"
    Abbr,
}

#[derive(Debug, Clone)]
struct TeamNames {
    team_id: i64,
    abbreviation: String,
    nickname: String,
    city: String,
    team_slug: String,
}

impl TeamNames {
    fn full(&self) -> String {
        format!("{} {}", self.city, self.nickname)
    }
}

/// Read-only queries over the `teams` table.
#[derive(Debug, Clone)]
pub struct TeamRepository {
    pool: SqlitePool,
}

impl TeamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TeamRepository { pool }
    }

    async fn load_names(&self) -> Result<Vec<TeamNames>, AppError> {
        let rows = sqlx::query(
            "SELECT team_id, abbreviation, nickname, city, team_slug FROM teams",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TeamNames {
                team_id: row.get("team_id"),
                abbreviation: row.get::<Option<String>, _>("abbreviation").unwrap_or_default(),
                nickname: row.get::<Option<String>, _>("nickname").unwrap_or_default(),
                city: row.get::<Option<String>, _>("city").unwrap_or_default(),
                team_slug: row.get::<Option<String>, _>("team_slug").unwrap_or_default(),
            })
            .collect())
    }

    /// Resolves a team id from any common rendering of its name. Exact
    /// matches are tried in order of specificity (abbreviation, nickname,
    /// "city nickname", slug) before falling back to fuzzy matching.
    pub async fn team_id_by_name(&self, name: &str) -> Result<Option<i64>, AppError> {
        let query = name.trim();
        if query.is_empty() {
            return Ok(None);
        }
        let teams = self.load_names().await?;
        let query_lower = query.to_lowercase();

        for team in &teams {
            if team.abbreviation.to_lowercase() == query_lower {
                return Ok(Some(team.team_id));
            }
        }
        for team in &teams {
            if team.nickname.to_lowercase() == query_lower {
                return Ok(Some(team.team_id));
            }
        }
        for team in &teams {
            if team.full().to_lowercase() == query_lower {
                return Ok(Some(team.team_id));
            }
        }
        for team in &teams {
            if team.team_slug.to_lowercase() == query_lower {
                return Ok(Some(team.team_id));
            }
        }

        // Fuzzy fallback across the fuller renderings.
        let mut best: Option<(f64, i64)> = None;
        for team in &teams {
            let score = [team.full(), team.nickname.clone(), team.team_slug.clone()]
                .iter()
                .map(|candidate| partial_token_sort_ratio(query, candidate))
                .fold(0.0f64, f64::max);
            if score >= TEAM_FUZZY_THRESHOLD
                && best.is_none_or(|(best_score, _)| score > best_score)
            {
                best = Some((score, team.team_id));
            }
        }

        if let Some((score, team_id)) = best {
            debug!("Fuzzy-matched team '{query}' to {team_id} (score {score:.1})");
            return Ok(Some(team_id));
        }
        Ok(None)
    }

    /// Renders a team's name in the requested form.
    pub async fn team_name_by_id(
        &self,
        team_id: i64,
        form: TeamNameForm,
    ) -> Result<Option<String>, AppError> {
        let row = sqlx::query(
            "SELECT abbreviation, nickname, city FROM teams WHERE team_id = ?",
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let abbreviation: Option<String> = row.get("abbreviation");
        let nickname: Option<String> = row.get("nickname");
        let city: Option<String> = row.get("city");

        let name = match form {
            TeamNameForm::Full => format!(
                "{} {}",
                city.unwrap_or_default(),
                nickname.unwrap_or_default()
            )
            .trim()
            .to_string(),
            TeamNameForm::Nickname => nickname.unwrap_or_default(),
            TeamNameForm::City => city.unwrap_or_default(),
            TeamNameForm::Abbr => abbreviation.unwrap_or_default(),
        };

        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn seeded_pool() -> SqlitePool {
        let pool = db::create_memory_pool().await.unwrap();
        db::init_schema(&pool).await.unwrap();

        let teams = [
            (1610612747i64, "LAL", "Lakers", "Los Angeles", "lakers"),
            (1610612744, "GSW", "Warriors", "Golden State", "warriors"),
            (1610612738, "BOS", "Celtics", "Boston", "celtics"),
            (1610612757, "POR", "Trail Blazers", "Portland", "blazers"),
        ];
        for (id, abbr, nick, city, slug) in teams {
            sqlx::query(
                "INSERT INTO teams (team_id, abbreviation, nickname, city, team_slug) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(abbr)
            .bind(nick)
            .bind(city)
            .bind(slug)
            .execute(&pool)
            .await
            .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn test_exact_match_priority() {
        let repo = TeamRepository::new(seeded_pool().await);
        assert_eq!(repo.team_id_by_name("LAL").await.unwrap(), Some(1610612747));
        assert_eq!(repo.team_id_by_name("lakers").await.unwrap(), Some(1610612747));
        assert_eq!(
            repo.team_id_by_name("Golden State Warriors").await.unwrap(),
            Some(1610612744)
        );
        assert_eq!(repo.team_id_by_name("blazers").await.unwrap(), Some(1610612757));
    }

    #[tokio::test]
    async fn test_fuzzy_match_above_threshold() {
        let repo = TeamRepository::new(seeded_pool().await);
        assert_eq!(
            repo.team_id_by_name("Lakerz").await.unwrap(),
            Some(1610612747)
        );
        assert_eq!(
            repo.team_id_by_name("Warriors Golden State").await.unwrap(),
            Some(1610612744)
        );
    }

    #[tokio::test]
    async fn test_no_match_below_threshold() {
        let repo = TeamRepository::new(seeded_pool().await);
        assert_eq!(repo.team_id_by_name("Zz Qq Xx").await.unwrap(), None);
        assert_eq!(repo.team_id_by_name("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_name_forms() {
        let repo = TeamRepository::new(seeded_pool().await);
        assert_eq!(
            repo.team_name_by_id(1610612747, TeamNameForm::Full).await.unwrap(),
            Some("Los Angeles Lakers".to_string())
        );
        assert_eq!(
            repo.team_name_by_id(1610612747, TeamNameForm::Nickname).await.unwrap(),
            Some("Lakers".to_string())
        );
        assert_eq!(
            repo.team_name_by_id(1610612747, TeamNameForm::City).await.unwrap(),
            Some("Los Angeles".to_string())
        );
        assert_eq!(
            repo.team_name_by_id(1610612747, TeamNameForm::Abbr).await.unwrap(),
            Some("LAL".to_string())
        );
        assert_eq!(
            repo.team_name_by_id(99, TeamNameForm::Full).await.unwrap(),
            None
        );
    }
}
