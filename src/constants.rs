//! Application-wide constants and configuration values
//!
//! This module centralizes magic numbers and vendor endpoint constants
//! to improve maintainability and make the codebase more configurable.

#![allow(dead_code)]

/// Default timeout for HTTP requests in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Timeout for the large schedule and video payloads in seconds
pub const LONG_HTTP_TIMEOUT_SECONDS: u64 = 60;

/// Maximum number of connections per host in the HTTP client pool
pub const HTTP_POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Vendor endpoint roots
pub mod urls {
    /// Static JSON CDN (schedule snapshots, live boxscore/playbyplay)
    pub const CDN_BASE: &str = "https://cdn.nba.com/static/json";

    /// Live game data under the CDN root
    pub const LIVE_DATA: &str = "https://cdn.nba.com/static/json/liveData";

    /// Stats API root (teamdetails, commonallplayers, videodetailsasset, ...)
    pub const STATS_BASE: &str = "https://stats.nba.com/stats";

    /// Media-ops S3 mirror used as a fallback when the primary hosts fail
    pub const S3_MIRROR: &str = "https://nba-prod-us-east-1-mediaops-stats.s3.amazonaws.com/NBA";

    /// Team logo CDN
    pub const LOGO_BASE: &str = "https://cdn.nba.com/logos/nba";

    /// Player headshot CDN
    pub const HEADSHOT_BASE: &str = "https://cdn.nba.com/headshots/nba/latest";
}

/// Cache TTL (Time To Live) values in seconds
pub mod cache_ttl {
    /// TTL for season schedule payloads (1 day; schedules change daily at most)
    pub const SCHEDULE_SECONDS: u64 = 86_400;

    /// TTL for team detail payloads (7 days)
    pub const TEAM_DETAILS_SECONDS: u64 = 7 * 86_400;

    /// TTL for historical (inactive) player detail payloads (10 years)
    pub const PLAYER_HISTORICAL_SECONDS: u64 = 10 * 365 * 86_400;

    /// TTL for boxscore/playbyplay while a game is live (2 minutes)
    pub const GAME_LIVE_SECONDS: u64 = 120;

    /// TTL for boxscore/playbyplay of finished games (30 days)
    pub const GAME_FINAL_SECONDS: u64 = 30 * 86_400;

    /// TTL for video URL manifests (1 hour)
    pub const VIDEO_SECONDS: u64 = 3_600;

    /// TTL for raw headshot images (90 days)
    pub const HEADSHOT_RAW_SECONDS: u64 = 90 * 86_400;
}

/// Retry configuration defaults
pub mod retry {
    /// Maximum number of retry attempts for API calls
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Maximum delay between retries (milliseconds)
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// Multiplier applied per attempt
    pub const BACKOFF_FACTOR: f64 = 2.0;

    /// Fractional jitter applied to each computed delay
    pub const JITTER_FACTOR: f64 = 0.1;
}

/// Per-host request pacing defaults in seconds
pub mod pacing {
    /// Minimum interval between requests to a data host
    pub const DATA_MIN_SECONDS: f64 = 0.3;

    /// Maximum (jittered) interval between requests to a data host
    pub const DATA_MAX_SECONDS: f64 = 3.0;

    /// Minimum interval between requests to the video endpoint
    pub const VIDEO_MIN_SECONDS: f64 = 8.0;

    /// Maximum (jittered) interval between requests to the video endpoint
    pub const VIDEO_MAX_SECONDS: f64 = 15.0;
}

/// Batch orchestration defaults
pub mod batch {
    /// Default number of items per processing chunk
    pub const DEFAULT_BATCH_SIZE: usize = 20;

    /// Items between progress checkpoints
    pub const DEFAULT_SAVE_INTERVAL: usize = 50;

    /// Sliding-window request cap: at most this many requests...
    pub const WINDOW_MAX_REQUESTS: usize = 60;

    /// ...per this many seconds
    pub const WINDOW_SECONDS: u64 = 60;
}

/// Season bounds for full-history schedule sweeps
pub mod season {
    /// Earliest season with usable schedule data
    pub const START_SEASON: &str = "1970-71";

    /// Current season
    pub const CURRENT_SEASON: &str = "2024-25";

    /// NBA league id as used by the stats API
    pub const NBA_LEAGUE_ID: &str = "00";
}

/// Environment variable names
pub mod env_vars {
    /// Override the root data directory
    pub const ROOT_PATH: &str = "COURTSYNC_ROOT";

    /// Override the database file path
    pub const DB_PATH: &str = "COURTSYNC_DB_PATH";

    /// Override the log file path
    pub const LOG_FILE: &str = "COURTSYNC_LOG_FILE";

    /// Override the HTTP request timeout in seconds
    pub const HTTP_TIMEOUT: &str = "COURTSYNC_HTTP_TIMEOUT";

    /// Override the current season (YYYY-YY)
    pub const CURRENT_SEASON: &str = "COURTSYNC_CURRENT_SEASON";
}
