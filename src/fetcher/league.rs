//! League-wide fetcher: the full player roster and the franchise id list

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument};

use crate::cache::{CacheStore, TtlPolicy};
use crate::config::Config;
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;

use super::{FetchRequest, Fetcher};

const CACHE_PREFIX: &str = "leaguefetcher";

/// The thirty franchise ids. Vendor team ids are stable and the franchise
/// list changes only with league expansion.
pub const ALL_TEAM_IDS: [i64; 30] = [
    1610612737, 1610612738, 1610612739, 1610612740, 1610612741, 1610612742, 1610612743,
    1610612744, 1610612745, 1610612746, 1610612747, 1610612748, 1610612749, 1610612750,
    1610612751, 1610612752, 1610612753, 1610612754, 1610612755, 1610612756, 1610612757,
    1610612758, 1610612759, 1610612760, 1610612761, 1610612762, 1610612763, 1610612764,
    1610612765, 1610612766,
];

/// League-scope lookups. The roster endpoint is deliberately never cached:
/// player/team assignments move daily during the season and the roster is
/// the source of truth for PlayerSync.
#[derive(Debug)]
pub struct LeagueFetcher {
    fetcher: Fetcher,
}

impl LeagueFetcher {
    pub fn new(config: &Config, http: Arc<HttpClient>) -> Result<Self, AppError> {
        let cache = CacheStore::new(
            config.cache_root().join("league"),
            TtlPolicy::fixed(Duration::ZERO),
        )?;
        Ok(LeagueFetcher {
            fetcher: Fetcher::new(
                CACHE_PREFIX,
                Some(config.stats_base_url.clone()),
                http,
                cache,
            ),
        })
    }

    /// The league-wide player roster (`commonallplayers`), always fetched
    /// fresh.
    #[instrument(skip(self))]
    pub async fn get_all_players(&self, current_season_only: bool) -> Result<Value, AppError> {
        info!(
            "Fetching league roster (current_season_only={current_season_only}, cache_policy=no_cache)"
        );
        let payload = self
            .fetcher
            .fetch(FetchRequest::endpoint("commonallplayers").params(vec![
                (
                    "LeagueID".to_string(),
                    constants::season::NBA_LEAGUE_ID.to_string(),
                ),
                (
                    "IsOnlyCurrentSeason".to_string(),
                    if current_season_only { "1" } else { "0" }.to_string(),
                ),
            ]))
            .await?;

        if payload.get("resultSets").is_none() {
            return Err(AppError::api_unexpected_structure(
                "missing resultSets",
                "commonallplayers",
            ));
        }
        Ok(payload)
    }

    /// Known franchise ids for batch jobs over all teams.
    pub fn all_team_ids(&self) -> Vec<i64> {
        ALL_TEAM_IDS.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_setup(dir: &TempDir, base: &str) -> LeagueFetcher {
        let mut config = Config::default();
        config.root_path = dir.path().to_path_buf();
        config.stats_base_url = base.to_string();
        let http = Arc::new(
            HttpClient::new(crate::http::HttpSettings {
                pace_min: Duration::ZERO,
                pace_max: Duration::ZERO,
                ..Default::default()
            })
            .unwrap(),
        );
        LeagueFetcher::new(&config, http).unwrap()
    }

    #[tokio::test]
    async fn test_roster_is_never_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/commonallplayers"))
            .and(query_param("IsOnlyCurrentSeason", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultSets": [{"name": "CommonAllPlayers", "headers": [], "rowSet": []}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        fetcher.get_all_players(false).await.unwrap();
        fetcher.get_all_players(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_roster_shape_validated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/commonallplayers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bad": true})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        assert!(matches!(
            fetcher.get_all_players(true).await,
            Err(AppError::ApiUnexpectedStructure { .. })
        ));
    }

    #[test]
    fn test_thirty_distinct_franchises() {
        let ids = ALL_TEAM_IDS;
        assert_eq!(ids.len(), 30);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 30);
    }
}
