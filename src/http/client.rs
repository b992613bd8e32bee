//! Connection-pooled HTTP gateway shared by all fetchers

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::config::Config;
use crate::constants;
use crate::error::AppError;

use super::rate_limiter::HostPacer;
use super::retry::RetryConfig;

/// Browser-identifying header set sent with every request. The vendor's
/// endpoints reject clients that do not look like the official web property.
fn default_headers() -> HeaderMap {
    let pairs: [(&str, &str); 13] = [
        ("accept", "application/json, text/plain, */*"),
        ("accept-language", "zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        ("cache-control", "no-cache"),
        ("dnt", "1"),
        ("pragma", "no-cache"),
        ("origin", "https://www.nba.com"),
        ("referer", "https://www.nba.com/"),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-site"),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
        (
            "user-agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
        ),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

/// Settings for constructing an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub pace_min: Duration,
    pub pace_max: Duration,
    pub fallback_urls: HashMap<String, String>,
    /// Additional headers layered over the default browser set.
    pub extra_headers: Vec<(String, String)>,
}

impl HttpSettings {
    /// Standard settings for the data endpoints.
    pub fn from_config(config: &Config) -> Self {
        HttpSettings {
            timeout: Duration::from_secs(config.request_timeout),
            retry: RetryConfig {
                max_retries: config.max_retries,
                ..RetryConfig::default()
            },
            pace_min: Duration::from_secs_f64(config.rate_limit_min),
            pace_max: Duration::from_secs_f64(config.rate_limit_max),
            fallback_urls: config.fallback_urls.clone(),
            extra_headers: Vec::new(),
        }
    }

    /// Settings for the heavily throttled video endpoint: long timeout,
    /// patient retries, 8-15 s pacing.
    pub fn video(config: &Config) -> Self {
        HttpSettings {
            timeout: Duration::from_secs(constants::LONG_HTTP_TIMEOUT_SECONDS),
            retry: RetryConfig::video(),
            pace_min: Duration::from_secs_f64(constants::pacing::VIDEO_MIN_SECONDS),
            pace_max: Duration::from_secs_f64(constants::pacing::VIDEO_MAX_SECONDS),
            fallback_urls: config.fallback_urls.clone(),
            extra_headers: vec![("host".to_string(), "stats.nba.com".to_string())],
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout: Duration::from_secs(constants::DEFAULT_HTTP_TIMEOUT_SECONDS),
            retry: RetryConfig::default(),
            pace_min: Duration::from_secs_f64(constants::pacing::DATA_MIN_SECONDS),
            pace_max: Duration::from_secs_f64(constants::pacing::DATA_MAX_SECONDS),
            fallback_urls: HashMap::new(),
            extra_headers: Vec::new(),
        }
    }
}

/// Single HTTP gateway with per-host pacing, retry with exponential backoff,
/// and fallback-host rewriting. Safe for concurrent callers; callers sharing
/// a host are serialized by the pacer.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    retry: RetryConfig,
    pacer: HostPacer,
    fallback_urls: HashMap<String, String>,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> Result<Self, AppError> {
        let mut headers = default_headers();
        for (name, value) in &settings.extra_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(constants::HTTP_POOL_MAX_IDLE_PER_HOST)
            .default_headers(headers)
            .build()?;

        Ok(HttpClient {
            client,
            retry: settings.retry,
            pacer: HostPacer::new(settings.pace_min, settings.pace_max),
            fallback_urls: settings.fallback_urls,
        })
    }

    /// Fetches a JSON payload. Retries transient failures, then tries the
    /// configured fallback host once before giving up.
    #[instrument(skip(self, params))]
    pub async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, AppError> {
        let response = self.request(url, params).await?;
        let final_url = response.url().to_string();
        let text = response.text().await.map_err(AppError::ApiFetch)?;

        debug!("Response length: {} bytes", text.len());

        match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                error!("Failed to parse API response: {} (URL: {})", e, final_url);
                if text.trim().is_empty() {
                    Err(AppError::api_no_data("Response body is empty", final_url))
                } else if !text.trim_start().starts_with('{') && !text.trim_start().starts_with('[')
                {
                    Err(AppError::api_unexpected_structure(
                        "Response is not valid JSON",
                        final_url,
                    ))
                } else {
                    Err(AppError::api_unexpected_structure(e.to_string(), final_url))
                }
            }
        }
    }

    /// Fetches a raw byte payload (logo and headshot assets).
    #[instrument(skip(self))]
    pub async fn get_bytes(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self.request(url, &[]).await?;
        response.bytes().await.map_err(AppError::ApiFetch)
    }

    async fn request(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, AppError> {
        match self.attempt_with_retries(url, params).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if let Some(fallback) = self.fallback_url(url) {
                    warn!(
                        "All attempts against {url} failed ({e}); trying fallback {fallback}"
                    );
                    self.attempt_once(&fallback, params).await
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn attempt_with_retries(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, AppError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt_once(url, params).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retry.max_retries && Self::is_retryable(&e) => {
                    let mut wait = self.retry.delay_for_attempt(attempt);
                    if let AppError::ApiRateLimit { reason, .. } = &e {
                        // After a 429 the next delay is at least doubled;
                        // a Retry-After hint can push it further out.
                        wait *= 2;
                        if let Ok(hinted) = reason.parse::<u64>() {
                            wait = wait.max(Duration::from_secs(hinted));
                        }
                    }
                    warn!(
                        "Transient failure for {url}: {e}. Retrying in {wait:?} (attempt {}/{})",
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_once(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, AppError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        self.pacer.pace(&host).await;

        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request.send().await.map_err(|e| {
            error!("Request failed for URL {url}: {e}");
            AppError::ApiFetch(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reason = status.canonical_reason().unwrap_or("Unknown error");
        error!("HTTP {} - {} (URL: {})", status.as_u16(), reason, url);

        Err(match status {
            StatusCode::NOT_FOUND => AppError::api_not_found(url),
            StatusCode::TOO_MANY_REQUESTS => {
                // Carry the Retry-After hint (seconds) through the error so
                // the retry loop can honor it.
                let hint = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or(reason)
                    .to_string();
                AppError::api_rate_limit(hint, url)
            }
            s if s.is_client_error() => AppError::api_client_error(s.as_u16(), reason, url),
            s => AppError::api_server_error(s.as_u16(), reason, url),
        })
    }

    fn is_retryable(error: &AppError) -> bool {
        match error {
            AppError::ApiFetch(e) => e.is_timeout() || e.is_connect(),
            e => e.is_transient(),
        }
    }

    /// Rewrites the URL's host prefix per the fallback map, if any entry
    /// matches.
    fn fallback_url(&self, url: &str) -> Option<String> {
        self.fallback_urls.iter().find_map(|(prefix, replacement)| {
            url.strip_prefix(prefix.as_str())
                .map(|rest| format!("{replacement}{rest}"))
        })
    }
}
