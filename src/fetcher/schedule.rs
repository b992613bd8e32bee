//! Season schedule fetcher (`scheduleleaguev2`)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::cache::{CacheStore, TtlPolicy};
use crate::config::{season_start_year, Config};
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;

use super::{FetchRequest, Fetcher};

const CACHE_PREFIX: &str = "schedulefetcher";
const SCHEDULE_ENDPOINT: &str = "scheduleleaguev2";

/// Schedule-specific knobs. The post-call delay de-synchronizes bulk season
/// sweeps; tests zero it out.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub base_url: String,
    pub current_season: String,
    pub start_season: String,
    /// Random delay range in seconds applied after each network call.
    pub sweep_delay: (f64, f64),
}

impl ScheduleSettings {
    pub fn from_config(config: &Config) -> Self {
        ScheduleSettings {
            base_url: config.stats_base_url.clone(),
            current_season: config.schedule_current_season.clone(),
            start_season: config.schedule_start_season.clone(),
            sweep_delay: (3.0, 10.0),
        }
    }
}

/// Fetches league schedules season by season, cached for a day per season.
#[derive(Debug)]
pub struct ScheduleFetcher {
    fetcher: Fetcher,
    settings: ScheduleSettings,
}

impl ScheduleFetcher {
    pub fn new(
        config: &Config,
        settings: ScheduleSettings,
        http: Arc<HttpClient>,
    ) -> Result<Self, AppError> {
        let cache = CacheStore::new(
            config.cache_root().join("schedule"),
            TtlPolicy::fixed(Duration::from_secs(constants::cache_ttl::SCHEDULE_SECONDS)),
        )?;
        Ok(ScheduleFetcher {
            fetcher: Fetcher::new(CACHE_PREFIX, Some(settings.base_url.clone()), http, cache),
            settings,
        })
    }

    pub fn current_season(&self) -> &str {
        &self.settings.current_season
    }

    /// Random post-call delay to avoid lock-step request patterns during
    /// multi-season sweeps.
    async fn apply_random_delay(&self) {
        let (min, max) = self.settings.sweep_delay;
        if max <= 0.0 {
            return;
        }
        let delay = rand::rng().random_range(min.min(max)..=max);
        info!("Applying post-fetch delay of {delay:.2}s");
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }

    /// Fetches one season's schedule, serving from cache when fresh. The
    /// delay is applied only after a network call, never after a cache hit.
    #[instrument(skip(self))]
    pub async fn get_by_season(&self, season: &str, force_refresh: bool) -> Result<Value, AppError> {
        self.get_by_season_with_delay(season, force_refresh, true)
            .await
    }

    async fn get_by_season_with_delay(
        &self,
        season: &str,
        force_refresh: bool,
        apply_delay: bool,
    ) -> Result<Value, AppError> {
        let cache_key = format!("schedule_{season}");

        if !force_refresh
            && let Some(cached) = self
                .fetcher
                .cache()
                .get(CACHE_PREFIX, &cache_key, None)
                .await?
        {
            info!("Season {season} schedule served from cache");
            return Ok(cached);
        }

        let params = vec![
            (
                "LeagueID".to_string(),
                constants::season::NBA_LEAGUE_ID.to_string(),
            ),
            ("Season".to_string(), season.to_string()),
        ];

        let payload = self
            .fetcher
            .fetch(FetchRequest::endpoint(SCHEDULE_ENDPOINT).params(params))
            .await?;

        if apply_delay {
            self.apply_random_delay().await;
        }

        // Shallow shape check; only valid payloads reach the cache.
        if !payload.is_object() || payload.get("leagueSchedule").is_none() {
            error!("Season {season} schedule payload missing leagueSchedule");
            return Err(AppError::api_unexpected_structure(
                "missing leagueSchedule",
                format!("{SCHEDULE_ENDPOINT}?Season={season}"),
            ));
        }

        if let Err(e) = self
            .fetcher
            .cache()
            .set(CACHE_PREFIX, &cache_key, &payload, None)
            .await
        {
            error!("Caching season {season} schedule failed: {e}");
        }

        Ok(payload)
    }

    /// Fetches several seasons in sequence, skipping the delay after the
    /// final one. Failed seasons are logged and omitted from the result.
    pub async fn get_for_seasons(
        &self,
        seasons: &[String],
        force_refresh: bool,
    ) -> HashMap<String, Value> {
        let mut results = HashMap::new();
        let total = seasons.len();

        for (i, season) in seasons.iter().enumerate() {
            info!("Fetching season {season} ({}/{total})", i + 1);
            let apply_delay = i + 1 < total;
            match self
                .get_by_season_with_delay(season, force_refresh, apply_delay)
                .await
            {
                Ok(payload) => {
                    results.insert(season.clone(), payload);
                }
                Err(e) => {
                    warn!("Fetching season {season} failed: {e}");
                }
            }
        }

        results
    }

    /// All seasons from the configured start through the current one, in
    /// `YYYY-YY` format.
    pub fn all_seasons(&self) -> Result<Vec<String>, AppError> {
        season_range(&self.settings.start_season, &self.settings.current_season)
    }

    /// Removes cached schedules older than the given age (defaults to the
    /// schedule TTL).
    pub async fn cleanup_cache(&self, older_than: Option<Duration>) -> Result<(), AppError> {
        let age = older_than
            .unwrap_or(Duration::from_secs(constants::cache_ttl::SCHEDULE_SECONDS));
        self.fetcher.cache().clear(CACHE_PREFIX, None, Some(age)).await
    }
}

/// Inclusive season sequence between two `YYYY-YY` bounds, one year per step.
pub fn season_range(start: &str, end: &str) -> Result<Vec<String>, AppError> {
    let start_year = season_start_year(start)?;
    let end_year = season_start_year(end)?;

    Ok((start_year..=end_year)
        .map(|year| format!("{year}-{:02}", (year + 1) % 100))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &TempDir, base_url: &str) -> Config {
        let mut config = Config::default();
        config.root_path = dir.path().to_path_buf();
        config.stats_base_url = base_url.to_string();
        config
    }

    fn test_fetcher(config: &Config) -> ScheduleFetcher {
        let settings = ScheduleSettings {
            sweep_delay: (0.0, 0.0),
            ..ScheduleSettings::from_config(config)
        };
        let http = Arc::new(
            HttpClient::new(crate::http::HttpSettings {
                pace_min: Duration::ZERO,
                pace_max: Duration::ZERO,
                ..Default::default()
            })
            .unwrap(),
        );
        ScheduleFetcher::new(config, settings, http).unwrap()
    }

    fn schedule_body() -> Value {
        json!({
            "meta": {"version": 1},
            "leagueSchedule": {
                "seasonYear": "2024-25",
                "gameDates": []
            }
        })
    }

    #[tokio::test]
    async fn test_cold_fetch_hits_network_and_writes_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scheduleleaguev2"))
            .and(query_param("Season", "2024-25"))
            .and(query_param("LeagueID", "00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schedule_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &server.uri());
        let fetcher = test_fetcher(&config);

        let payload = fetcher.get_by_season("2024-25", false).await.unwrap();
        assert!(payload.get("leagueSchedule").is_some());

        let cache_file = dir
            .path()
            .join("cache/schedule/schedulefetcher_schedule_2024-25.json");
        assert!(cache_file.exists());
        let wrapper: Value =
            serde_json::from_slice(&std::fs::read(&cache_file).unwrap()).unwrap();
        assert!(wrapper["timestamp"].is_i64());
        assert!(wrapper["last_updated"].is_string());
        assert_eq!(wrapper["data"], schedule_body());
    }

    #[tokio::test]
    async fn test_warm_fetch_makes_no_http_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scheduleleaguev2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schedule_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &server.uri());
        let fetcher = test_fetcher(&config);

        let first = fetcher.get_by_season("2024-25", false).await.unwrap();
        let second = fetcher.get_by_season("2024-25", false).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_shape_validation_rejects_missing_league_schedule() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scheduleleaguev2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oops": 1})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, &server.uri());
        let fetcher = test_fetcher(&config);

        let result = fetcher.get_by_season("2024-25", false).await;
        assert!(matches!(
            result,
            Err(AppError::ApiUnexpectedStructure { .. })
        ));
    }

    #[test]
    fn test_season_range_formatting() {
        let seasons = season_range("1998-99", "2001-02").unwrap();
        assert_eq!(seasons, vec!["1998-99", "1999-00", "2000-01", "2001-02"]);
    }

    #[test]
    fn test_season_range_single_season() {
        let seasons = season_range("2024-25", "2024-25").unwrap();
        assert_eq!(seasons, vec!["2024-25"]);
    }

    #[test]
    fn test_season_range_rejects_bad_format() {
        assert!(season_range("1998", "2001-02").is_err());
    }
}
