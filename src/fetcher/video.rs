//! Highlight-video manifest fetcher (`videodetailsasset`)
//!
//! The video endpoint throttles far harder than the data endpoints, so this
//! fetcher layers extra pre/post delays on top of the client's 8-15 s
//! per-host pacing and keeps batches small.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::cache::{CacheStore, TtlPolicy};
use crate::config::Config;
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;

use super::{BatchId, BatchOptions, BatchOutcome, FetchRequest, Fetcher};

const CACHE_PREFIX: &str = "videofetcher";
const VIDEO_ENDPOINT: &str = "videodetailsasset";

/// Statistic category a video query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMeasure {
    Fgm,
    Fga,
    Pts,
    Ast,
    Reb,
    Block,
    Stl,
    Tov,
}

impl ContextMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMeasure::Fgm => "FGM",
            ContextMeasure::Fga => "FGA",
            ContextMeasure::Pts => "PTS",
            ContextMeasure::Ast => "AST",
            ContextMeasure::Reb => "REB",
            ContextMeasure::Block => "BLOCK",
            ContextMeasure::Stl => "STL",
            ContextMeasure::Tov => "TOV",
        }
    }
}

/// Builds the endpoint's full parameter map from the small input set.
/// Absent inputs map to the sentinel empties the vendor expects; omitting
/// the keys entirely makes the endpoint return errors.
#[derive(Debug, Clone)]
pub struct VideoRequestParams {
    pub game_id: String,
    pub player_id: Option<i64>,
    pub team_id: Option<i64>,
    pub context_measure: Option<ContextMeasure>,
    pub season: String,
    pub season_type: String,
}

impl VideoRequestParams {
    pub fn new(game_id: &str, season: &str) -> Result<Self, AppError> {
        if game_id.is_empty() {
            return Err(AppError::config_error("game_id must not be empty"));
        }
        Ok(VideoRequestParams {
            game_id: game_id.to_string(),
            player_id: None,
            team_id: None,
            context_measure: None,
            season: season.to_string(),
            season_type: "Regular Season".to_string(),
        })
    }

    pub fn build(&self) -> Vec<(String, String)> {
        let s = |v: &str| v.to_string();
        vec![
            (s("LeagueID"), s(constants::season::NBA_LEAGUE_ID)),
            (s("Season"), self.season.clone()),
            (s("SeasonType"), self.season_type.clone()),
            (s("TeamID"), self.team_id.unwrap_or(0).to_string()),
            (s("PlayerID"), self.player_id.unwrap_or(0).to_string()),
            (s("GameID"), self.game_id.clone()),
            (
                s("ContextMeasure"),
                self.context_measure
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            ),
            (s("Outcome"), String::new()),
            (s("Location"), String::new()),
            (s("Month"), s("0")),
            (s("SeasonSegment"), String::new()),
            (s("DateFrom"), String::new()),
            (s("DateTo"), String::new()),
            (s("OpponentTeamID"), s("0")),
            (s("VsConference"), String::new()),
            (s("VsDivision"), String::new()),
            (s("Position"), String::new()),
            (s("RookieYear"), String::new()),
            (s("GameSegment"), String::new()),
            (s("Period"), s("0")),
            (s("LastNGames"), s("0")),
            (s("ClutchTime"), String::new()),
            (s("AheadBehind"), String::new()),
            (s("PointDiff"), String::new()),
            (s("RangeType"), s("0")),
            (s("StartPeriod"), s("0")),
            (s("EndPeriod"), s("0")),
            (s("StartRange"), s("0")),
            (s("EndRange"), s("31800")),
            (s("GroupQuantity"), s("5")),
            (s("PORound"), s("0")),
            (s("ContextFilter"), String::new()),
            (s("OppPlayerID"), String::new()),
        ]
    }
}

/// Extra jitter around each video call, in seconds. Zeroed in tests.
#[derive(Debug, Clone)]
pub struct VideoDelays {
    pub pre: (f64, f64),
    pub post: (f64, f64),
    /// Post-item delay inside batches.
    pub batch_interval: (f64, f64),
}

impl Default for VideoDelays {
    fn default() -> Self {
        VideoDelays {
            pre: (1.0, 3.0),
            post: (2.0, 4.0),
            batch_interval: (8.0, 12.0),
        }
    }
}

impl VideoDelays {
    pub fn none() -> Self {
        VideoDelays {
            pre: (0.0, 0.0),
            post: (0.0, 0.0),
            batch_interval: (0.0, 0.0),
        }
    }
}

async fn sleep_in_range((min, max): (f64, f64)) {
    if max <= 0.0 {
        return;
    }
    let secs = rand::rng().random_range(min.min(max)..=max);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

/// Fetches highlight-URL manifests. Downstream consumers read
/// `resultSets.Meta.videoUrls`; everything else passes through untouched.
#[derive(Debug)]
pub struct VideoFetcher {
    fetcher: Fetcher,
    season: String,
    delays: VideoDelays,
}

impl VideoFetcher {
    /// `http` should be built with [`crate::http::HttpSettings::video`] so
    /// the 8-15 s per-host pacing applies.
    pub fn new(
        config: &Config,
        http: Arc<HttpClient>,
        delays: VideoDelays,
    ) -> Result<Self, AppError> {
        let cache = CacheStore::new(
            config.cache_root().join("videourls"),
            TtlPolicy::fixed(Duration::from_secs(constants::cache_ttl::VIDEO_SECONDS)),
        )?;
        Ok(VideoFetcher {
            fetcher: Fetcher::new(
                CACHE_PREFIX,
                Some(config.stats_base_url.clone()),
                http,
                cache,
            ),
            season: config.schedule_current_season.clone(),
            delays,
        })
    }

    fn cache_key(params: &VideoRequestParams) -> String {
        format!(
            "video_{}_{}_{}_{}",
            params.game_id,
            params.team_id.unwrap_or(0),
            params.player_id.unwrap_or(0),
            params
                .context_measure
                .map(|m| m.as_str())
                .unwrap_or("ALL")
        )
    }

    /// Fetches the video manifest for a game, optionally narrowed to a
    /// player, team, or statistic category. An empty `videoUrls` list is a
    /// warning, not an error: the vendor intermittently requires a
    /// `ContextMeasure` before returning rows.
    #[instrument(skip(self))]
    pub async fn get_game_video_urls(
        &self,
        game_id: &str,
        context_measure: Option<ContextMeasure>,
        player_id: Option<i64>,
        team_id: Option<i64>,
        force_refresh: bool,
    ) -> Result<Value, AppError> {
        let params = VideoRequestParams {
            player_id,
            team_id,
            context_measure,
            ..VideoRequestParams::new(game_id, &self.season)?
        };

        info!(
            "Fetching video manifest for game {game_id} (player={player_id:?}, team={team_id:?}, measure={:?})",
            context_measure.map(|m| m.as_str())
        );

        sleep_in_range(self.delays.pre).await;

        let payload = self
            .fetcher
            .fetch(
                FetchRequest::endpoint(VIDEO_ENDPOINT)
                    .params(params.build())
                    .cache_key(Self::cache_key(&params))
                    .force_refresh(force_refresh),
            )
            .await?;

        sleep_in_range(self.delays.post).await;

        let complete = ["resource", "parameters", "resultSets"]
            .iter()
            .all(|key| payload.get(key).is_some());
        if !complete {
            warn!("Video payload for game {game_id} is structurally incomplete");
            return Err(AppError::api_unexpected_structure(
                "missing resource/parameters/resultSets",
                VIDEO_ENDPOINT,
            ));
        }

        let url_count = payload
            .pointer("/resultSets/Meta/videoUrls")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if url_count == 0 {
            warn!(
                "Video manifest for game {game_id} is empty; the game may have just ended or the category has no plays"
            );
        } else {
            info!("Video manifest for game {game_id} has {url_count} URLs");
        }

        Ok(payload)
    }

    /// Batch manifest fetch, capped at 5 games per chunk with long per-item
    /// delays.
    pub async fn batch_get_game_video_urls(
        &self,
        game_ids: &[String],
        options: BatchOptions,
    ) -> Result<BatchOutcome, AppError> {
        let ids: Vec<BatchId> = game_ids.iter().cloned().map(BatchId::from).collect();
        let options = BatchOptions {
            batch_size: Some(options.batch_size.unwrap_or(5).min(5)),
            ..options
        };

        info!("Batch video fetch for {} games", ids.len());
        self.fetcher
            .batch_fetch(
                &ids,
                |id| async move {
                    let result = self
                        .get_game_video_urls(&id.as_key(), None, None, None, false)
                        .await;
                    sleep_in_range(self.delays.batch_interval).await;
                    result
                },
                "game_videos",
                options,
            )
            .await
    }

    pub async fn clear_cache(&self) -> Result<(), AppError> {
        info!("Clearing video manifest cache");
        self.fetcher.cache().clear(CACHE_PREFIX, None, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_setup(dir: &TempDir, base: &str) -> VideoFetcher {
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
        VideoFetcher::new(&config, http, VideoDelays::none()).unwrap()
    }

    fn manifest_body(url_count: usize) -> Value {
        let urls: Vec<Value> = (0..url_count)
            .map(|i| json!({"uuid": format!("clip-{i}"), "lurl": format!("https://v/{i}.mp4")}))
            .collect();
        json!({
            "resource": "videodetailsasset",
            "parameters": {"GameID": "0022400408"},
            "resultSets": {"Meta": {"videoUrls": urls}}
        })
    }

    #[test]
    fn test_param_builder_expands_sentinels() {
        let params = VideoRequestParams::new("0022400408", "2024-25").unwrap();
        let built = params.build();
        assert_eq!(built.len(), 32);

        let get = |key: &str| {
            built
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("GameID"), "0022400408");
        assert_eq!(get("TeamID"), "0");
        assert_eq!(get("PlayerID"), "0");
        assert_eq!(get("ContextMeasure"), "");
        assert_eq!(get("EndRange"), "31800");
        assert_eq!(get("SeasonType"), "Regular Season");
    }

    #[test]
    fn test_param_builder_with_full_inputs() {
        let mut params = VideoRequestParams::new("0022400408", "2024-25").unwrap();
        params.player_id = Some(2544);
        params.team_id = Some(1610612747);
        params.context_measure = Some(ContextMeasure::Fgm);

        let built = params.build();
        let get = |key: &str| {
            built
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("PlayerID"), "2544");
        assert_eq!(get("TeamID"), "1610612747");
        assert_eq!(get("ContextMeasure"), "FGM");
    }

    #[test]
    fn test_empty_game_id_rejected() {
        assert!(VideoRequestParams::new("", "2024-25").is_err());
    }

    #[tokio::test]
    async fn test_manifest_fetch_and_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videodetailsasset"))
            .and(query_param("GameID", "0022400408"))
            .and(query_param("ContextMeasure", "FGM"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body(2)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        let payload = fetcher
            .get_game_video_urls("0022400408", Some(ContextMeasure::Fgm), None, None, false)
            .await
            .unwrap();
        let urls = payload
            .pointer("/resultSets/Meta/videoUrls")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_manifest_is_non_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videodetailsasset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body(0)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        let payload = fetcher
            .get_game_video_urls("0022400408", Some(ContextMeasure::Fga), None, None, false)
            .await
            .unwrap();
        assert!(payload.get("resultSets").is_some());
    }

    #[tokio::test]
    async fn test_incomplete_structure_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videodetailsasset"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"resource": "videodetailsasset"})),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_setup(&dir, &server.uri());
        let result = fetcher
            .get_game_video_urls("0022400408", None, None, None, false)
            .await;
        assert!(matches!(
            result,
            Err(AppError::ApiUnexpectedStructure { .. })
        ));
    }
}
