//! Team detail fetcher (`teamdetails`)

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument};

use crate::cache::{CacheStore, TtlPolicy};
use crate::config::Config;
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;

use super::{BatchId, BatchOptions, BatchOutcome, FetchRequest, Fetcher};

const CACHE_PREFIX: &str = "teamfetcher";

/// Fetches franchise background details per team id, cached for a week.
#[derive(Debug)]
pub struct TeamFetcher {
    fetcher: Fetcher,
}

impl TeamFetcher {
    pub fn new(config: &Config, http: Arc<HttpClient>) -> Result<Self, AppError> {
        let cache = CacheStore::new(
            config.cache_root().join("teams"),
            TtlPolicy::fixed(Duration::from_secs(
                constants::cache_ttl::TEAM_DETAILS_SECONDS,
            )),
        )?;
        Ok(TeamFetcher {
            fetcher: Fetcher::new(
                CACHE_PREFIX,
                Some(config.stats_base_url.clone()),
                http,
                cache,
            ),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_details(&self, team_id: i64, force_refresh: bool) -> Result<Value, AppError> {
        if team_id <= 0 {
            return Err(AppError::config_error(format!(
                "team_id must be positive, got {team_id}"
            )));
        }

        info!("Fetching details for team {team_id}");
        self.fetcher
            .fetch(
                FetchRequest::endpoint("teamdetails")
                    .params(vec![("TeamID".to_string(), team_id.to_string())])
                    .cache_key(format!("details_{team_id}"))
                    .force_refresh(force_refresh),
            )
            .await
    }

    /// Batch-fetches details for the given team ids with resumable progress.
    pub async fn get_multiple_details(
        &self,
        team_ids: &[i64],
        force_refresh: bool,
        options: BatchOptions,
    ) -> Result<BatchOutcome, AppError> {
        let ids: Vec<BatchId> = team_ids.iter().copied().map(BatchId::from).collect();
        self.fetcher
            .batch_fetch(
                &ids,
                |id| async move {
                    match id {
                        BatchId::Int(team_id) => self.get_details(team_id, force_refresh).await,
                        BatchId::Str(s) => Err(AppError::config_error(format!(
                            "team batch received non-integer id '{s}'"
                        ))),
                    }
                },
                "team_details_batch",
                options,
            )
            .await
    }

    /// Removes one team's cached details, or all entries older than the
    /// given age.
    pub async fn cleanup_cache(
        &self,
        team_id: Option<i64>,
        older_than: Option<Duration>,
    ) -> Result<(), AppError> {
        match team_id {
            Some(team_id) => {
                let key = format!("details_{team_id}");
                self.fetcher.cache().clear(CACHE_PREFIX, Some(&key), None).await
            }
            None => {
                let age = older_than.unwrap_or(Duration::from_secs(
                    constants::cache_ttl::TEAM_DETAILS_SECONDS,
                ));
                self.fetcher.cache().clear(CACHE_PREFIX, None, Some(age)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_setup(dir: &TempDir, base: &str) -> TeamFetcher {
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
        TeamFetcher::new(&config, http).unwrap()
    }

    fn details_body(team_id: i64) -> Value {
        json!({
            "resource": "teamdetails",
            "resultSets": [{
                "name": "TeamBackground",
                "headers": ["TEAM_ID", "ABBREVIATION", "NICKNAME", "CITY"],
                "rowSet": [[team_id, "LAL", "Lakers", "Los Angeles"]]
            }]
        })
    }

    #[tokio::test]
    async fn test_details_cached_for_second_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/teamdetails"))
            .and(query_param("TeamID", "1610612747"))
            .respond_with(ResponseTemplate::new(200).set_body_json(details_body(1610612747)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());

        let first = fetcher.get_details(1610612747, false).await.unwrap();
        let second = fetcher.get_details(1610612747, false).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_team_id() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, "http://localhost:1");
        assert!(fetcher.get_details(0, false).await.is_err());
        assert!(fetcher.get_details(-5, false).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_details_returns_per_team_payloads() {
        let server = MockServer::start().await;
        for id in [1610612747i64, 1610612744] {
            Mock::given(method("GET"))
                .and(path("/teamdetails"))
                .and(query_param("TeamID", id.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(details_body(id)))
                .mount(&server)
                .await;
        }

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());

        let outcome = fetcher
            .get_multiple_details(&[1610612747, 1610612744], false, BatchOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            outcome.results["1610612747"]["resultSets"][0]["rowSet"][0][0],
            1610612747i64
        );
    }
}
