//! Fetcher framework: a uniform fetch-with-cache-or-network primitive and a
//! resumable batch orchestrator, plus one module per vendor endpoint family.

pub mod game;
pub mod league;
pub mod player;
pub mod resultsets;
pub mod schedule;
pub mod team;
pub mod video;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::cache::progress::{ProgressStats, ProgressTracker};
use crate::cache::CacheStore;
use crate::constants;
use crate::error::AppError;
use crate::http::HttpClient;
use crate::http::rate_limiter::RequestWindow;

/// Batch item id preserving its original type. Team ids arrive as integers,
/// game ids as strings; progress files key everything by the string form and
/// the original type is reconstructed before each `fetch_single` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BatchId {
    Int(i64),
    Str(String),
}

impl BatchId {
    pub fn as_key(&self) -> String {
        match self {
            BatchId::Int(n) => n.to_string(),
            BatchId::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchId::Int(n) => write!(f, "{n}"),
            BatchId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for BatchId {
    fn from(value: i64) -> Self {
        BatchId::Int(value)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        BatchId::Str(value.to_string())
    }
}

impl From<String> for BatchId {
    fn from(value: String) -> Self {
        BatchId::Str(value)
    }
}

/// Where a fetch result came from, recorded in the per-fetch log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    CacheHit,
    CacheMiss,
    ForceRefresh,
    NoCache,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchSource::CacheHit => "cache-hit",
            FetchSource::CacheMiss => "cache-miss",
            FetchSource::ForceRefresh => "force-refresh",
            FetchSource::NoCache => "no-cache",
        };
        write!(f, "{label}")
    }
}

/// A single fetch: either a full `url` or an `endpoint` joined to the
/// fetcher's base URL, with optional caching.
#[derive(Debug, Default)]
pub struct FetchRequest<'a> {
    pub url: Option<&'a str>,
    pub endpoint: Option<&'a str>,
    pub params: Vec<(String, String)>,
    pub cache_key: Option<String>,
    pub ttl_class: Option<&'a str>,
    pub force_refresh: bool,
    pub metadata: Option<Value>,
}

impl<'a> FetchRequest<'a> {
    pub fn endpoint(endpoint: &'a str) -> Self {
        FetchRequest {
            endpoint: Some(endpoint),
            ..Default::default()
        }
    }

    pub fn url(url: &'a str) -> Self {
        FetchRequest {
            url: Some(url),
            ..Default::default()
        }
    }

    pub fn params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn ttl_class(mut self, class: &'a str) -> Self {
        self.ttl_class = Some(class);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Options for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub batch_size: Option<usize>,
    pub save_interval: Option<usize>,
    pub window_max_requests: Option<usize>,
    pub window_seconds: Option<u64>,
    /// Cooperative cancellation: when set, the current item finishes,
    /// progress is flushed, and the batch returns partial results.
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

/// Result of a batch run: one payload per successfully fetched id, keyed by
/// the id's string form.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: HashMap<String, Value>,
    pub status: BatchStatus,
    pub stats: ProgressStats,
}

/// Composes the HTTP client, the payload cache, and the progress tracker
/// into the primitive every endpoint fetcher is built on.
#[derive(Debug, Clone)]
pub struct Fetcher {
    name: &'static str,
    base_url: Option<String>,
    http: Arc<HttpClient>,
    cache: CacheStore,
}

impl Fetcher {
    /// `name` doubles as the cache file prefix for this fetcher family.
    pub fn new(
        name: &'static str,
        base_url: Option<String>,
        http: Arc<HttpClient>,
        cache: CacheStore,
    ) -> Self {
        Fetcher {
            name,
            base_url,
            http,
            cache,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    fn resolve_url(&self, request: &FetchRequest<'_>) -> Result<String, AppError> {
        if let Some(url) = request.url {
            return Ok(url.to_string());
        }
        match (request.endpoint, &self.base_url) {
            (Some(endpoint), Some(base)) => Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )),
            (Some(endpoint), None) => Ok(endpoint.to_string()),
            (None, _) => Err(AppError::config_error(
                "fetch request needs a url or an endpoint",
            )),
        }
    }

    /// Cache-or-network fetch. Cache read errors fall through to the
    /// network; cache write failures are logged and the payload is still
    /// returned.
    #[instrument(skip(self, request), fields(fetcher = self.name))]
    pub async fn fetch(&self, request: FetchRequest<'_>) -> Result<Value, AppError> {
        let source = if request.cache_key.is_none() {
            FetchSource::NoCache
        } else if request.force_refresh {
            FetchSource::ForceRefresh
        } else {
            FetchSource::CacheMiss
        };

        if let (Some(cache_key), false) = (&request.cache_key, request.force_refresh) {
            match self.cache.get(self.name, cache_key, request.ttl_class).await {
                Ok(Some(payload)) => {
                    info!(
                        "Data source [{}]: {} - key: {cache_key}",
                        FetchSource::CacheHit,
                        self.name
                    );
                    return Ok(payload);
                }
                Ok(None) => {}
                Err(e) => {
                    // A broken cache never blocks the network path.
                    error!("Cache read failed for {} ({cache_key}): {e}", self.name);
                }
            }
        }

        let url = self.resolve_url(&request)?;
        let payload = self.http.get_json(&url, &request.params).await?;

        let reason = match source {
            FetchSource::NoCache => "no cache key",
            FetchSource::ForceRefresh => "forced refresh",
            _ => "cache miss or expired",
        };
        info!(
            "Data source [{source}]: {} - reason: {reason}{}",
            self.name,
            request
                .cache_key
                .as_deref()
                .map(|k| format!(" - key: {k}"))
                .unwrap_or_default()
        );

        if let Some(cache_key) = &request.cache_key
            && let Err(e) = self
                .cache
                .set(self.name, cache_key, &payload, request.metadata.clone())
                .await
        {
            error!("Cache write failed for {} ({cache_key}): {e}", self.name);
        }

        Ok(payload)
    }

    /// Batch-fetches ids through `fetch_single` with resumable progress, a
    /// sliding-window rate cap, and periodic checkpoints. Ids already
    /// completed in a previous run are still passed through `fetch_single`
    /// (which is expected to serve them from cache) so the returned mapping
    /// covers the full input set.
    pub async fn batch_fetch<F, Fut>(
        &self,
        ids: &[BatchId],
        fetch_single: F,
        task_name: &str,
        options: BatchOptions,
    ) -> Result<BatchOutcome, AppError>
    where
        F: Fn(BatchId) -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        let mut tracker = ProgressTracker::load(task_name, self.cache.root()).await?;

        let all_keys: Vec<String> = ids.iter().map(BatchId::as_key).collect();
        let id_by_key: HashMap<String, BatchId> = ids
            .iter()
            .map(|id| (id.as_key(), id.clone()))
            .collect();

        let pending = tracker.pending_ids(&all_keys);
        info!(
            "Batch task {task_name}: {} ids total, {} pending",
            ids.len(),
            pending.len()
        );

        let mut results: HashMap<String, Value> = HashMap::new();

        // Previously completed ids: refetch through the callback (cache
        // path) so resumed runs return the complete set.
        for key in &all_keys {
            if !tracker.is_completed(key) {
                continue;
            }
            let id = id_by_key[key].clone();
            match fetch_single(id).await {
                Ok(Value::Null) => {}
                Ok(payload) => {
                    results.insert(key.clone(), payload);
                }
                Err(e) => {
                    error!("Refetching completed id {key} failed: {e}");
                }
            }
        }

        let batch_size = options
            .batch_size
            .unwrap_or(constants::batch::DEFAULT_BATCH_SIZE)
            .max(1);
        let save_interval = options
            .save_interval
            .unwrap_or(constants::batch::DEFAULT_SAVE_INTERVAL)
            .max(1);
        let mut window = RequestWindow::new(
            options
                .window_max_requests
                .unwrap_or(constants::batch::WINDOW_MAX_REQUESTS),
            Duration::from_secs(
                options
                    .window_seconds
                    .unwrap_or(constants::batch::WINDOW_SECONDS),
            ),
        );

        let cancelled = |options: &BatchOptions| {
            options
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
        };

        let mut processed = 0usize;
        let total_chunks = pending.len().div_ceil(batch_size).max(1);

        'chunks: for (chunk_index, chunk) in pending.chunks(batch_size).enumerate() {
            info!(
                "Batch task {task_name}: chunk {}/{} ({} ids)",
                chunk_index + 1,
                total_chunks,
                chunk.len()
            );

            for key in chunk {
                if cancelled(&options) {
                    warn!("Batch task {task_name} cancelled, flushing progress");
                    tracker.save().await?;
                    return Ok(BatchOutcome {
                        results,
                        status: BatchStatus::Cancelled,
                        stats: tracker.stats(),
                    });
                }

                window.admit().await;

                let id = id_by_key[key].clone();
                match fetch_single(id).await {
                    Ok(Value::Null) => {
                        tracker.mark_failed(key, "empty payload");
                    }
                    Ok(payload) => {
                        results.insert(key.clone(), payload);
                        tracker.mark_completed(key);
                    }
                    Err(e) => {
                        error!("Batch task {task_name}: id {key} failed: {e}");
                        tracker.mark_failed(key, &e.to_string());
                    }
                }

                processed += 1;
                if processed % save_interval == 0 {
                    tracker.save().await?;
                    let stats = tracker.stats();
                    let (count, elapsed) = window.rate_snapshot();
                    let rate = if elapsed.as_secs_f64() > 0.0 {
                        count as f64 / elapsed.as_secs_f64()
                    } else {
                        0.0
                    };
                    info!(
                        "Batch task {task_name}: {}% ({}) at {rate:.2} req/s",
                        stats.completion_percentage, stats.progress
                    );
                }

                if cancelled(&options) {
                    warn!("Batch task {task_name} cancelled after in-flight item");
                    break 'chunks;
                }
            }

            tracker.save().await?;
        }

        tracker.save().await?;
        let stats = tracker.stats();
        info!(
            "Batch task {task_name} done: total {}, completed {}, failed {}",
            stats.total, stats.completed, stats.failed
        );

        let status = if cancelled(&options) {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };

        Ok(BatchOutcome {
            results,
            status,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlPolicy;
    use crate::http::HttpSettings;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_http() -> Arc<HttpClient> {
        let settings = HttpSettings {
            pace_min: Duration::ZERO,
            pace_max: Duration::ZERO,
            ..HttpSettings::default()
        };
        Arc::new(HttpClient::new(settings).unwrap())
    }

    fn test_fetcher(dir: &TempDir, base_url: Option<String>, ttl: Duration) -> Fetcher {
        let cache = CacheStore::new(dir.path().to_path_buf(), TtlPolicy::fixed(ttl)).unwrap();
        Fetcher::new("testfetcher", base_url, test_http(), cache)
    }

    #[tokio::test]
    async fn test_fetch_populates_and_serves_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedule"))
            .and(query_param("Season", "2024-25"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"leagueSchedule": {}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, Some(server.uri()), Duration::from_secs(3600));

        let params = vec![("Season".to_string(), "2024-25".to_string())];
        let first = fetcher
            .fetch(
                FetchRequest::endpoint("schedule")
                    .params(params.clone())
                    .cache_key("schedule_2024-25"),
            )
            .await
            .unwrap();

        // Second call: zero HTTP traffic, bytewise-equal payload.
        let second = fetcher
            .fetch(
                FetchRequest::endpoint("schedule")
                    .params(params)
                    .cache_key("schedule_2024-25"),
            )
            .await
            .unwrap();
        assert_eq!(first, second);

        let cache_file = dir.path().join("testfetcher_schedule_2024-25.json");
        assert!(cache_file.exists());
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"v": 1})))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, Some(server.uri()), Duration::from_secs(3600));

        for _ in 0..2 {
            fetcher
                .fetch(
                    FetchRequest::endpoint("data")
                        .cache_key("k")
                        .force_refresh(true),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fetch_without_cache_key_always_hits_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/roster"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"r": []})))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, Some(server.uri()), Duration::from_secs(3600));
        for _ in 0..2 {
            fetcher
                .fetch(FetchRequest::endpoint("roster"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_url_passthrough_without_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liveData/boxscore/boxscore_1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"game": {}})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, None, Duration::from_secs(60));
        let url = format!("{}/liveData/boxscore/boxscore_1.json", server.uri());
        let value = fetcher.fetch(FetchRequest::url(&url)).await.unwrap();
        assert!(value.get("game").is_some());
    }

    #[tokio::test]
    async fn test_batch_fetch_complete_mapping() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, None, Duration::from_secs(60));

        let ids: Vec<BatchId> = (1..=5).map(BatchId::from).collect();
        let outcome = fetcher
            .batch_fetch(
                &ids,
                |id| async move { Ok(json!(format!("ok-{id}"))) },
                "complete_mapping",
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, BatchStatus::Completed);
        assert_eq!(outcome.results.len(), 5);
        for i in 1..=5 {
            assert_eq!(outcome.results[&i.to_string()], json!(format!("ok-{i}")));
        }
    }

    #[tokio::test]
    async fn test_batch_fetch_resume_skips_completed() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, None, Duration::from_secs(60));
        let ids: Vec<BatchId> = (1..=5).map(BatchId::from).collect();

        // First run: the callback starts failing at id 4, so ids 1-3
        // complete and 4-5 are recorded as failed.
        let calls = Arc::new(AtomicUsize::new(0));
        let first_calls = calls.clone();
        let outcome = fetcher
            .batch_fetch(
                &ids,
                move |id| {
                    let calls = first_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        match id {
                            BatchId::Int(n) if n >= 4 => {
                                Err(AppError::Custom("injected failure".to_string()))
                            }
                            other => Ok(json!(format!("ok-{other}"))),
                        }
                    }
                },
                "resume_test",
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.stats.completed, 3);
        assert_eq!(outcome.stats.failed, 2);

        // Second run with the failure fixed: ids 4 and 5 are the only
        // pending fetches; the three completed ids are re-read through the
        // callback (the cache path) so the final mapping has all 5 entries.
        let second_calls = Arc::new(AtomicUsize::new(0));
        let counter = second_calls.clone();
        let outcome = fetcher
            .batch_fetch(
                &ids,
                move |id| {
                    let calls = counter.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!(format!("ok-{id}")))
                    }
                },
                "resume_test",
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 5);
        assert_eq!(outcome.stats.failed, 0);
        // 3 cache-path re-reads + 2 pending fetches.
        assert_eq!(second_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_batch_fetch_preserves_id_types() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, None, Duration::from_secs(60));

        let ids = vec![BatchId::Int(1610612747), BatchId::from("0022400408")];
        let outcome = fetcher
            .batch_fetch(
                &ids,
                |id| async move {
                    match &id {
                        BatchId::Int(n) => Ok(json!({"int": n})),
                        BatchId::Str(s) => Ok(json!({"str": s})),
                    }
                },
                "typed_ids",
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results["1610612747"], json!({"int": 1610612747i64}));
        assert_eq!(outcome.results["0022400408"], json!({"str": "0022400408"}));
    }

    #[tokio::test]
    async fn test_batch_fetch_empty_payload_marked_failed() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, None, Duration::from_secs(60));

        let ids = vec![BatchId::Int(1), BatchId::Int(2)];
        let outcome = fetcher
            .batch_fetch(
                &ids,
                |id| async move {
                    match id {
                        BatchId::Int(1) => Ok(json!({"ok": 1})),
                        _ => Ok(Value::Null),
                    }
                },
                "empty_payloads",
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.stats.failed, 1);
    }

    #[tokio::test]
    async fn test_batch_fetch_cancellation_flushes_progress() {
        let dir = TempDir::new().unwrap();
        let fetcher = test_fetcher(&dir, None, Duration::from_secs(60));

        let cancel = Arc::new(AtomicBool::new(false));
        let ids: Vec<BatchId> = (1..=10).map(BatchId::from).collect();

        let flag = cancel.clone();
        let outcome = fetcher
            .batch_fetch(
                &ids,
                move |id| {
                    let flag = flag.clone();
                    async move {
                        if id == BatchId::Int(3) {
                            flag.store(true, Ordering::Relaxed);
                        }
                        Ok(json!(format!("ok-{id}")))
                    }
                },
                "cancel_test",
                BatchOptions {
                    cancel: Some(cancel.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, BatchStatus::Cancelled);
        assert!(outcome.results.len() >= 3);
        assert!(outcome.results.len() < 10);

        // Progress survived the cancellation.
        let tracker = ProgressTracker::load("cancel_test", fetcher.cache().root())
            .await
            .unwrap();
        assert!(tracker.is_completed("3"));
    }
}
