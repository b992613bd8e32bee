use crate::constants;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration structure for the application.
/// Handles loading, saving, and managing sync settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Root directory for all runtime data (cache, database, logs).
    pub root_path: PathBuf,
    /// Cache root directory. Defaults to `<root_path>/cache`.
    #[serde(default)]
    pub cache_root: Option<PathBuf>,
    /// SQLite database file path. Defaults to `<root_path>/courtsync.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Path to the log file. If not specified, logs go to `<root_path>/logs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,
    /// Stats API root. Overridable for testing against a mock server.
    #[serde(default = "default_stats_base_url")]
    pub stats_base_url: String,
    /// Live-data CDN root. Overridable for testing against a mock server.
    #[serde(default = "default_cdn_base_url")]
    pub cdn_base_url: String,
    /// Maximum retry attempts per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// HTTP timeout in seconds for API requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Minimum per-host interval between requests, in seconds.
    #[serde(default = "default_rate_limit_min")]
    pub rate_limit_min: f64,
    /// Maximum (jittered) per-host interval between requests, in seconds.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: f64,
    /// Current season in `YYYY-YY` format, e.g. `2024-25`.
    #[serde(default = "default_current_season")]
    pub schedule_current_season: String,
    /// Earliest season fetched by full-history sweeps, in `YYYY-YY` format.
    #[serde(default = "default_start_season")]
    pub schedule_start_season: String,
    /// Host-prefix rewrites tried once after all retries against a primary
    /// host have failed.
    #[serde(default = "default_fallback_urls")]
    pub fallback_urls: HashMap<String, String>,
    /// Bypass caches on every fetch.
    #[serde(default)]
    pub force_refresh: bool,
}

fn default_stats_base_url() -> String {
    constants::urls::STATS_BASE.to_string()
}

fn default_cdn_base_url() -> String {
    constants::urls::LIVE_DATA.to_string()
}

fn default_max_retries() -> u32 {
    constants::retry::MAX_ATTEMPTS
}

fn default_request_timeout() -> u64 {
    constants::DEFAULT_HTTP_TIMEOUT_SECONDS
}

fn default_rate_limit_min() -> f64 {
    constants::pacing::DATA_MIN_SECONDS
}

fn default_rate_limit_max() -> f64 {
    constants::pacing::DATA_MAX_SECONDS
}

fn default_current_season() -> String {
    constants::season::CURRENT_SEASON.to_string()
}

fn default_start_season() -> String {
    constants::season::START_SEASON.to_string()
}

fn default_fallback_urls() -> HashMap<String, String> {
    HashMap::from([
        (
            "https://cdn.nba.com/static/json".to_string(),
            constants::urls::S3_MIRROR.to_string(),
        ),
        (
            "https://stats.nba.com/stats".to_string(),
            format!("{}/stats", constants::urls::S3_MIRROR),
        ),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_path: default_root_path(),
            cache_root: None,
            db_path: None,
            log_file_path: None,
            stats_base_url: default_stats_base_url(),
            cdn_base_url: default_cdn_base_url(),
            max_retries: default_max_retries(),
            request_timeout: default_request_timeout(),
            rate_limit_min: default_rate_limit_min(),
            rate_limit_max: default_rate_limit_max(),
            schedule_current_season: default_current_season(),
            schedule_start_season: default_start_season(),
            fallback_urls: default_fallback_urls(),
            force_refresh: false,
        }
    }
}

/// Platform data directory, falling back to the current directory.
fn default_root_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("courtsync"))
        .unwrap_or_else(|| PathBuf::from("./courtsync-data"))
}

impl Config {
    /// Loads configuration from the default config file location, creating a
    /// default config when no file exists. Environment variables override
    /// config file values.
    ///
    /// # Environment Variables
    /// - `COURTSYNC_ROOT` - Override the root data directory
    /// - `COURTSYNC_DB_PATH` - Override the database file path
    /// - `COURTSYNC_LOG_FILE` - Override the log file path
    /// - `COURTSYNC_HTTP_TIMEOUT` - Override the HTTP timeout in seconds
    /// - `COURTSYNC_CURRENT_SEASON` - Override the current season
    pub async fn load() -> Result<Self, AppError> {
        let config_path = get_config_path();

        let mut config = if Path::new(&config_path).exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Ok(root) = std::env::var(constants::env_vars::ROOT_PATH) {
            config.root_path = PathBuf::from(root);
        }
        if let Ok(db_path) = std::env::var(constants::env_vars::DB_PATH) {
            config.db_path = Some(PathBuf::from(db_path));
        }
        if let Ok(log_file_path) = std::env::var(constants::env_vars::LOG_FILE) {
            config.log_file_path = Some(log_file_path);
        }
        if let Some(timeout) = std::env::var(constants::env_vars::HTTP_TIMEOUT)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.request_timeout = timeout;
        }
        if let Ok(season) = std::env::var(constants::env_vars::CURRENT_SEASON) {
            config.schedule_current_season = season;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration settings. Runs before any I/O so that
    /// invalid settings fail fast.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.root_path.as_os_str().is_empty() {
            return Err(AppError::config_error("root_path must not be empty"));
        }
        if self.request_timeout == 0 {
            return Err(AppError::config_error("request_timeout must be positive"));
        }
        if self.rate_limit_min < 0.0 || self.rate_limit_max < self.rate_limit_min {
            return Err(AppError::config_error(format!(
                "invalid rate limit range: {} - {}",
                self.rate_limit_min, self.rate_limit_max
            )));
        }
        validate_season_format(&self.schedule_current_season)?;
        validate_season_format(&self.schedule_start_season)?;
        let start = season_start_year(&self.schedule_start_season)?;
        let current = season_start_year(&self.schedule_current_season)?;
        if start > current {
            return Err(AppError::config_error(format!(
                "schedule_start_season {} is after schedule_current_season {}",
                self.schedule_start_season, self.schedule_current_season
            )));
        }
        Ok(())
    }

    /// Saves current configuration to the default config file location.
    pub async fn save(&self) -> Result<(), AppError> {
        let config_path = get_config_path();
        self.save_to_path(&config_path).await
    }

    /// Saves configuration to a specific path, creating parent directories.
    pub async fn save_to_path(&self, path: &str) -> Result<(), AppError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Cache root directory, defaulting under the root path.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_root
            .clone()
            .unwrap_or_else(|| self.root_path.join("cache"))
    }

    /// Database file path, defaulting under the root path.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.root_path.join("courtsync.db"))
    }

    /// Log directory, defaulting under the root path.
    pub fn log_dir(&self) -> PathBuf {
        self.root_path.join("logs")
    }

    /// Displays current configuration settings to stdout.
    pub async fn display() -> Result<(), AppError> {
        let config_path = get_config_path();

        if Path::new(&config_path).exists() {
            let config = Config::load().await?;
            println!("\nCurrent Configuration");
            println!("────────────────────────────────────");
            println!("Config Location:");
            println!("{config_path}");
            println!("────────────────────────────────────");
            println!("Data Root:");
            println!("{}", config.root_path.display());
            println!("────────────────────────────────────");
            println!("Database:");
            println!("{}", config.db_path().display());
            println!("────────────────────────────────────");
            println!("Current Season:");
            println!("{}", config.schedule_current_season);
            println!("────────────────────────────────────");
            println!("HTTP Timeout:");
            println!("{} seconds", config.request_timeout);
        } else {
            println!("\nNo configuration file found at:");
            println!("{config_path}");
            println!("Defaults will be used until one is saved.");
        }

        Ok(())
    }
}

/// Returns the platform-specific path for the config file.
pub fn get_config_path() -> String {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir
        .join("courtsync")
        .join("config.toml")
        .to_string_lossy()
        .to_string()
}

/// Checks a season string against the `YYYY-YY` format, e.g. `2024-25`.
pub fn validate_season_format(season: &str) -> Result<(), AppError> {
    let valid = season.len() == 7
        && season.as_bytes()[4] == b'-'
        && season[..4].chars().all(|c| c.is_ascii_digit())
        && season[5..].chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(AppError::config_error(format!(
            "season must be in YYYY-YY format, got '{season}'"
        )));
    }
    // The two-digit suffix must be the start year plus one.
    let start: u32 = season[..4]
        .parse()
        .map_err(|_| AppError::config_error(format!("invalid season year in '{season}'")))?;
    let suffix: u32 = season[5..]
        .parse()
        .map_err(|_| AppError::config_error(format!("invalid season suffix in '{season}'")))?;
    if (start + 1) % 100 != suffix {
        return Err(AppError::config_error(format!(
            "season suffix does not follow start year in '{season}'"
        )));
    }
    Ok(())
}

/// First calendar year of a `YYYY-YY` season string.
pub fn season_start_year(season: &str) -> Result<u32, AppError> {
    validate_season_format(season)?;
    season[..4]
        .parse()
        .map_err(|_| AppError::config_error(format!("invalid season year in '{season}'")))
}
