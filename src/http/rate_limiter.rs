//! Request pacing: per-host minimum intervals and sliding-window caps

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

/// Per-host request governor.
///
/// Before each request the caller awaits its host's turn: at least
/// `min_interval` (jittered up to `max_interval`) must have elapsed since
/// the previous request to the same host. Callers sharing a host are
/// serialized; different hosts proceed independently.
#[derive(Debug)]
pub struct HostPacer {
    min_interval: Duration,
    max_interval: Duration,
    hosts: Mutex<HashMap<String, Arc<AsyncMutex<Option<Instant>>>>>,
}

impl HostPacer {
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        HostPacer {
            min_interval,
            max_interval: max_interval.max(min_interval),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn host_entry(&self, host: &str) -> Arc<AsyncMutex<Option<Instant>>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Waits until the host's interval has elapsed and records the new
    /// request time. The per-host lock is held across the sleep so that
    /// concurrent callers to the same host queue up behind it.
    pub async fn pace(&self, host: &str) {
        let entry = self.host_entry(host);
        let mut last = entry.lock().await;

        if let Some(previous) = *last {
            let interval = self.jittered_interval();
            let ready_at = previous + interval;
            let now = Instant::now();
            if ready_at > now {
                let wait = ready_at - now;
                debug!("Pacing request to {host}: waiting {wait:?}");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }

    fn jittered_interval(&self) -> Duration {
        if self.max_interval <= self.min_interval {
            return self.min_interval;
        }
        let secs = rand::rng()
            .random_range(self.min_interval.as_secs_f64()..=self.max_interval.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Sliding-window request cap used by batch jobs: at most `max_requests`
/// requests per `window`. When the window is saturated the caller sleeps
/// until it reopens.
#[derive(Debug)]
pub struct RequestWindow {
    max_requests: usize,
    window: Duration,
    started: Instant,
    count: usize,
}

impl RequestWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RequestWindow {
            max_requests,
            window,
            started: Instant::now(),
            count: 0,
        }
    }

    /// Records one request, sleeping first if the window is saturated.
    pub async fn admit(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.started) > self.window {
            self.started = now;
            self.count = 0;
        }

        if self.count >= self.max_requests {
            // One extra second of safety margin past the window edge.
            let reopen = self.window.saturating_sub(now.duration_since(self.started))
                + Duration::from_secs(1);
            debug!("Request window saturated, waiting {reopen:?}");
            tokio::time::sleep(reopen).await;
            self.started = Instant::now();
            self.count = 0;
        }

        self.count += 1;
    }

    /// Requests admitted in the current window and the window's age, for
    /// progress logging.
    pub fn rate_snapshot(&self) -> (usize, Duration) {
        (self.count, self.started.elapsed())
    }
}
