//! Live-data game fetcher: boxscore and play-by-play halves of a game

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::instrument;

use crate::cache::{CacheStore, TtlPolicy};
use crate::config::Config;
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;

use super::{FetchRequest, Fetcher};

const CACHE_PREFIX: &str = "gamefetcher";

/// TTL class for games still in progress.
pub const TTL_LIVE: &str = "live";
/// TTL class for finished games, whose payloads no longer change.
pub const TTL_FINAL: &str = "final";

/// Vendor game-status code for a finished game.
const GAME_STATUS_FINAL: i64 = 3;

/// Fetches per-game boxscore and play-by-play JSON from the live-data CDN.
/// Cache freshness follows the game's status: short TTL while live, long
/// once final.
#[derive(Debug)]
pub struct GameFetcher {
    fetcher: Fetcher,
    cdn_base_url: String,
}

impl GameFetcher {
    pub fn new(config: &Config, http: Arc<HttpClient>) -> Result<Self, AppError> {
        let cache = CacheStore::new(
            config.cache_root().join("games"),
            TtlPolicy::with_classes(
                Duration::from_secs(constants::cache_ttl::GAME_LIVE_SECONDS),
                [
                    (
                        TTL_LIVE,
                        Duration::from_secs(constants::cache_ttl::GAME_LIVE_SECONDS),
                    ),
                    (
                        TTL_FINAL,
                        Duration::from_secs(constants::cache_ttl::GAME_FINAL_SECONDS),
                    ),
                ],
            ),
        )?;
        Ok(GameFetcher {
            fetcher: Fetcher::new(CACHE_PREFIX, None, http, cache),
            cdn_base_url: config.cdn_base_url.clone(),
        })
    }

    /// Picks the TTL class for a cached payload from its embedded game
    /// status: finished games keep their long TTL, everything else is
    /// treated as live.
    async fn ttl_class_for(&self, cache_key: &str) -> &'static str {
        match self.fetcher.cache().entry(CACHE_PREFIX, cache_key).await {
            Ok(Some(entry)) => {
                let status = entry
                    .data
                    .pointer("/game/gameStatus")
                    .and_then(Value::as_i64);
                if status == Some(GAME_STATUS_FINAL) {
                    TTL_FINAL
                } else {
                    TTL_LIVE
                }
            }
            _ => TTL_LIVE,
        }
    }

    async fn fetch_half(
        &self,
        kind: &str,
        game_id: &str,
        force_refresh: bool,
    ) -> Result<Value, AppError> {
        let cache_key = format!("{kind}_{game_id}");
        let ttl_class = self.ttl_class_for(&cache_key).await;
        let url = format!("{}/{kind}/{kind}_{game_id}.json", self.cdn_base_url);

        self.fetcher
            .fetch(
                FetchRequest::url(&url)
                    .cache_key(&cache_key)
                    .ttl_class(ttl_class)
                    .force_refresh(force_refresh),
            )
            .await
    }

    /// Per-game aggregate team and player statistics.
    #[instrument(skip(self))]
    pub async fn get_boxscore(&self, game_id: &str, force_refresh: bool) -> Result<Value, AppError> {
        self.fetch_half("boxscore", game_id, force_refresh).await
    }

    /// Ordered event sequence for a game. The vendor's event schema is
    /// preserved; parsing and typing is a consumer concern.
    #[instrument(skip(self))]
    pub async fn get_playbyplay(
        &self,
        game_id: &str,
        force_refresh: bool,
    ) -> Result<Value, AppError> {
        self.fetch_half("playbyplay", game_id, force_refresh).await
    }

    /// Fetches both halves concurrently and merges them into
    /// `{game, meta, playByPlay}`.
    #[instrument(skip(self))]
    pub async fn get_game_data(
        &self,
        game_id: &str,
        force_refresh: bool,
    ) -> Result<Value, AppError> {
        let (boxscore, playbyplay) = futures::join!(
            self.get_boxscore(game_id, force_refresh),
            self.get_playbyplay(game_id, force_refresh)
        );
        let boxscore = boxscore?;
        let playbyplay = playbyplay?;

        Ok(json!({
            "game": boxscore.get("game").cloned().unwrap_or(Value::Null),
            "meta": boxscore.get("meta").cloned().unwrap_or(Value::Null),
            "playByPlay": playbyplay,
        }))
    }

    pub async fn cleanup_cache(&self, older_than: Option<Duration>) -> Result<(), AppError> {
        self.fetcher
            .cache()
            .clear(CACHE_PREFIX, None, older_than)
            .await
    }
}
