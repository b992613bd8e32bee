//! Player detail fetcher (`commonplayerinfo`) and headshot downloads

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStore, TtlPolicy};
use crate::config::Config;
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;

use super::resultsets;
use super::{BatchId, BatchOptions, BatchOutcome, FetchRequest, Fetcher};

const CACHE_PREFIX: &str = "playerfetcher";

/// TTL class for players on an active roster: always refreshed.
pub const TTL_ACTIVE: &str = "active";
/// TTL class for historical players, whose records no longer change.
pub const TTL_HISTORICAL: &str = "historical";

/// Valid headshot sizes offered by the image CDN.
const HEADSHOT_SIZES: [&str; 2] = ["260x190", "1040x760"];

/// Decides whether a `commonplayerinfo` payload describes a historical
/// player. The vendor encodes roster status inconsistently: sometimes the
/// string `"Inactive"`, sometimes a numeric `0`; both mean historical.
pub fn is_historical(payload: &Value) -> bool {
    let Some(set) = resultsets::find(payload, "CommonPlayerInfo") else {
        return false;
    };
    let Some(row) = set.first_row() else {
        return false;
    };
    match row.get("ROSTERSTATUS") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("inactive"),
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        _ => false,
    }
}

/// Fetches per-player details with a two-class cache policy (active players
/// always refresh, historical players keep for years) plus raw headshot
/// images on a long mtime-based file cache.
#[derive(Debug)]
pub struct PlayerFetcher {
    fetcher: Fetcher,
    headshot_base_url: String,
    headshot_dir: PathBuf,
}

impl PlayerFetcher {
    pub fn new(config: &Config, http: Arc<HttpClient>) -> Result<Self, AppError> {
        let cache = CacheStore::new(
            config.cache_root().join("players"),
            TtlPolicy::with_classes(
                Duration::ZERO,
                [
                    (TTL_ACTIVE, Duration::ZERO),
                    (
                        TTL_HISTORICAL,
                        Duration::from_secs(constants::cache_ttl::PLAYER_HISTORICAL_SECONDS),
                    ),
                ],
            ),
        )?;

        let headshot_dir = config.cache_root().join("players").join("headshots");
        std::fs::create_dir_all(headshot_dir.join("raw")).map_err(|e| {
            AppError::config_error(format!("failed to create headshot cache directory: {e}"))
        })?;

        Ok(PlayerFetcher {
            fetcher: Fetcher::new(
                CACHE_PREFIX,
                Some(config.stats_base_url.clone()),
                http,
                cache,
            ),
            headshot_base_url: constants::urls::HEADSHOT_BASE.to_string(),
            headshot_dir,
        })
    }

    /// Fetches one player's details. Historical players are served from the
    /// long-lived cache; active players always hit the network and their
    /// fresh payload decides the cache class going forward.
    #[instrument(skip(self))]
    pub async fn get_info(&self, player_id: i64, force_refresh: bool) -> Result<Value, AppError> {
        let cache_key = format!("player_info_{player_id}");

        if !force_refresh
            && let Some(cached) = self
                .fetcher
                .cache()
                .get(CACHE_PREFIX, &cache_key, Some(TTL_HISTORICAL))
                .await?
            && is_historical(&cached)
        {
            debug!("Player {player_id} is historical, serving cached details");
            return Ok(cached);
        }

        let payload = self
            .fetcher
            .fetch(
                FetchRequest::endpoint("commonplayerinfo")
                    .params(vec![
                        ("PlayerID".to_string(), player_id.to_string()),
                        ("LeagueID".to_string(), String::new()),
                    ])
                    .cache_key(&cache_key)
                    .force_refresh(true)
                    .metadata(json!({"player_id": player_id})),
            )
            .await?;

        if payload.get("resultSets").is_none() {
            warn!("Player {player_id} info payload has no resultSets");
            return Err(AppError::api_unexpected_structure(
                "missing resultSets",
                "commonplayerinfo",
            ));
        }

        let status = if is_historical(&payload) {
            TTL_HISTORICAL
        } else {
            TTL_ACTIVE
        };
        debug!("Player {player_id} classified as {status}");

        Ok(payload)
    }

    /// Batch player-detail fetch with resumable progress, 20 per chunk.
    pub async fn batch_get_infos(
        &self,
        player_ids: &[i64],
        force_refresh: bool,
        options: BatchOptions,
    ) -> Result<BatchOutcome, AppError> {
        info!(
            "Starting player detail batch: {} players, force_refresh={force_refresh}",
            player_ids.len()
        );
        let ids: Vec<BatchId> = player_ids.iter().copied().map(BatchId::from).collect();
        let options = BatchOptions {
            batch_size: options.batch_size.or(Some(20)),
            ..options
        };
        self.fetcher
            .batch_fetch(
                &ids,
                |id| async move {
                    match id {
                        BatchId::Int(player_id) => self.get_info(player_id, force_refresh).await,
                        BatchId::Str(s) => Err(AppError::config_error(format!(
                            "player batch received non-integer id '{s}'"
                        ))),
                    }
                },
                "player_info_batch",
                options,
            )
            .await
    }

    /// Official headshot URL for a player id.
    pub fn headshot_url(&self, player_id: i64, size: &str) -> String {
        let size = if HEADSHOT_SIZES.contains(&size) {
            size
        } else {
            warn!("Invalid headshot size {size}, using 260x190");
            "260x190"
        };
        format!("{}/{size}/{player_id}.png", self.headshot_base_url)
    }

    #[cfg(test)]
    fn set_headshot_base_url(&mut self, base: String) {
        self.headshot_base_url = base;
    }

    fn headshot_cache_path(&self, player_id: i64, size: &str) -> PathBuf {
        self.headshot_dir
            .join("raw")
            .join(format!("player_{player_id}_{size}.png"))
    }

    /// Downloads a player's raw headshot, reusing a cached file younger
    /// than the raw-image TTL. Image post-processing is a consumer concern.
    #[instrument(skip(self))]
    pub async fn fetch_headshot_raw(
        &self,
        player_id: i64,
        size: &str,
        force_refresh: bool,
    ) -> Result<Bytes, AppError> {
        let path = self.headshot_cache_path(player_id, size);

        if !force_refresh
            && let Ok(meta) = tokio::fs::metadata(&path).await
            && let Ok(modified) = meta.modified()
            && let Ok(age) = modified.elapsed()
            && age < Duration::from_secs(constants::cache_ttl::HEADSHOT_RAW_SECONDS)
        {
            debug!("Serving cached headshot for player {player_id}");
            return Ok(Bytes::from(tokio::fs::read(&path).await?));
        }

        let url = self.headshot_url(player_id, size);
        let image = self.fetcher.http().get_bytes(&url).await?;

        if let Err(e) = tokio::fs::write(&path, &image).await {
            warn!("Failed to cache headshot for player {player_id}: {e}");
        }

        Ok(image)
    }

    /// Clears cached player details older than the given age (all when no
    /// age is given) and expired headshot files.
    pub async fn cleanup_cache(&self, older_than: Option<Duration>) -> Result<(), AppError> {
        self.fetcher
            .cache()
            .clear(CACHE_PREFIX, None, older_than)
            .await?;

        let max_age = older_than
            .unwrap_or(Duration::from_secs(constants::cache_ttl::HEADSHOT_RAW_SECONDS));
        let raw_dir = self.headshot_dir.join("raw");
        let mut dir = match tokio::fs::read_dir(&raw_dir).await {
            Ok(dir) => dir,
            Err(_) => return Ok(()),
        };
        while let Some(file) = dir.next_entry().await? {
            let expired = file
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|m| m.elapsed().ok())
                .is_some_and(|age| age > max_age);
            if expired && let Err(e) = tokio::fs::remove_file(file.path()).await {
                warn!("Failed to remove headshot {}: {e}", file.path().display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_setup(dir: &TempDir, base: &str) -> PlayerFetcher {
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
        PlayerFetcher::new(&config, http).unwrap()
    }

    fn info_body(player_id: i64, roster_status: Value) -> Value {
        json!({
            "resource": "commonplayerinfo",
            "resultSets": [{
                "name": "CommonPlayerInfo",
                "headers": ["PERSON_ID", "DISPLAY_FIRST_LAST", "ROSTERSTATUS", "TEAM_ID"],
                "rowSet": [[player_id, "Test Player", roster_status, 1610612747]]
            }]
        })
    }

    #[test]
    fn test_historical_classification() {
        assert!(is_historical(&info_body(1, json!("Inactive"))));
        assert!(is_historical(&info_body(1, json!("inactive"))));
        assert!(is_historical(&info_body(1, json!(0))));
        assert!(!is_historical(&info_body(1, json!("Active"))));
        assert!(!is_historical(&info_body(1, json!(1))));
        assert!(!is_historical(&json!({"resultSets": []})));
    }

    #[tokio::test]
    async fn test_active_player_always_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/commonplayerinfo"))
            .and(query_param("PlayerID", "2544"))
            .respond_with(ResponseTemplate::new(200).set_body_json(info_body(2544, json!("Active"))))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        fetcher.get_info(2544, false).await.unwrap();
        fetcher.get_info(2544, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_historical_player_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/commonplayerinfo"))
            .and(query_param("PlayerID", "76001"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(info_body(76001, json!("Inactive"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        let first = fetcher.get_info(76001, false).await.unwrap();
        let second = fetcher.get_info(76001, false).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_historical_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/commonplayerinfo"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(info_body(76001, json!("Inactive"))),
            )
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        fetcher.get_info(76001, false).await.unwrap();
        fetcher.get_info(76001, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_headshot_cached_by_mtime() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/260x190/2544.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut fetcher = test_setup(&dir, "http://unused.example");
        fetcher.set_headshot_base_url(server.uri());

        let first = fetcher.fetch_headshot_raw(2544, "260x190", false).await.unwrap();
        let second = fetcher.fetch_headshot_raw(2544, "260x190", false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_ref(), b"png-bytes");
    }

    #[test]
    fn test_invalid_headshot_size_falls_back() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, "http://unused.example");
        let url = fetcher.headshot_url(2544, "999x999");
        assert!(url.contains("/260x190/2544.png"));
    }
}
