use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to fetch data from API: {0}")]
    ApiFetch(#[from] reqwest::Error),

    #[error("Failed to parse API response: {0}")]
    ApiParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Date/time parsing error: {0}")]
    DateTimeParse(String),

    #[error("Log setup error: {0}")]
    LogSetup(String),

    #[error("API endpoint not found: {url}")]
    ApiNotFound { url: String },

    #[error("API rate limit exceeded ({reason}): {url}")]
    ApiRateLimit { reason: String, url: String },

    #[error("API client error {status} ({reason}): {url}")]
    ApiClientError {
        status: u16,
        reason: String,
        url: String,
    },

    #[error("API server error {status} ({reason}): {url}")]
    ApiServerError {
        status: u16,
        reason: String,
        url: String,
    },

    #[error("API returned no data ({reason}): {url}")]
    ApiNoData { reason: String, url: String },

    #[error("Unexpected API response structure ({message}): {url}")]
    ApiUnexpectedStructure { message: String, url: String },

    #[error("Batch task cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Custom(String),
}

impl AppError {
    /// Create a configuration error with context
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a date/time parsing error with context
    pub fn datetime_parse_error(msg: impl Into<String>) -> Self {
        Self::DateTimeParse(msg.into())
    }

    /// Create a log setup error with context
    pub fn log_setup_error(msg: impl Into<String>) -> Self {
        Self::LogSetup(msg.into())
    }

    pub fn api_not_found(url: impl Into<String>) -> Self {
        Self::ApiNotFound { url: url.into() }
    }

    pub fn api_rate_limit(reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ApiRateLimit {
            reason: reason.into(),
            url: url.into(),
        }
    }

    pub fn api_client_error(status: u16, reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ApiClientError {
            status,
            reason: reason.into(),
            url: url.into(),
        }
    }

    pub fn api_server_error(status: u16, reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ApiServerError {
            status,
            reason: reason.into(),
            url: url.into(),
        }
    }

    pub fn api_no_data(reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ApiNoData {
            reason: reason.into(),
            url: url.into(),
        }
    }

    pub fn api_unexpected_structure(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ApiUnexpectedStructure {
            message: message.into(),
            url: url.into(),
        }
    }

    /// True for failures the HTTP client is allowed to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ApiRateLimit { .. } | Self::ApiServerError { .. }
        )
    }
}
