//! HTTP gateway: connection-pooled client with browser-identifying headers,
//! per-host pacing, exponential-backoff retries, and fallback-host rewriting.

pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use client::{HttpClient, HttpSettings};
pub use rate_limiter::{HostPacer, RequestWindow};
pub use retry::RetryConfig;
