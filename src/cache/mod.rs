//! File-backed payload cache with per-key TTL policy and atomic writes

pub mod progress;

pub use progress::{ProgressStats, ProgressTracker};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::AppError;

/// TTL table over optional classification keys. A fetcher may declare
/// multiple classes (e.g. "historical" players keep for years while "active"
/// players always refresh); the default duration applies when no class is
/// given.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default: Duration,
    classes: HashMap<String, Duration>,
}

impl TtlPolicy {
    pub fn fixed(default: Duration) -> Self {
        TtlPolicy {
            default,
            classes: HashMap::new(),
        }
    }

    pub fn with_classes<I>(default: Duration, classes: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Duration)>,
    {
        TtlPolicy {
            default,
            classes: classes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn duration_for(&self, class: Option<&str>) -> Duration {
        class
            .and_then(|c| self.classes.get(c).copied())
            .unwrap_or(self.default)
    }
}

/// On-disk wrapper around a cached vendor payload. `data` is the exact
/// payload the vendor returned; the wrapper fields are added by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: i64,
    pub last_updated: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CacheEntry {
    /// Entry age in whole seconds, clamped at zero for clock skew.
    pub fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp() - self.timestamp;
        Duration::from_secs(elapsed.max(0) as u64)
    }
}

/// Filesystem-backed store, one `{prefix}_{identifier}.json` file per entry
/// under a configurable root. Writes are temp-then-rename so concurrent
/// readers see either the old entry or the new one, never a torn file.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    policy: TtlPolicy,
}

impl CacheStore {
    /// Creates the store, ensuring the root directory exists. A root that
    /// cannot be created is a fatal configuration error.
    pub fn new(root: PathBuf, policy: TtlPolicy) -> Result<Self, AppError> {
        std::fs::create_dir_all(&root).map_err(|e| {
            AppError::config_error(format!(
                "failed to create cache directory {}: {e}",
                root.display()
            ))
        })?;
        Ok(CacheStore { root, policy })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn entry_path(&self, prefix: &str, identifier: &str) -> Result<PathBuf, AppError> {
        if prefix.is_empty() || identifier.is_empty() {
            return Err(AppError::config_error(
                "cache prefix and identifier must not be empty",
            ));
        }
        Ok(self.root.join(format!("{prefix}_{identifier}.json")))
    }

    /// Returns the cached payload if present and fresh under the TTL class.
    /// A corrupt entry is treated as a miss; it gets overwritten by the next
    /// successful fetch.
    pub async fn get(
        &self,
        prefix: &str,
        identifier: &str,
        ttl_class: Option<&str>,
    ) -> Result<Option<Value>, AppError> {
        let ttl = self.policy.duration_for(ttl_class);
        if ttl.is_zero() {
            return Ok(None);
        }

        match self.entry(prefix, identifier).await? {
            Some(entry) if entry.age() < ttl => Ok(Some(entry.data)),
            Some(entry) => {
                debug!(
                    "Cache entry expired: {prefix}_{identifier} (age {:?} >= ttl {:?})",
                    entry.age(),
                    ttl
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Reads the raw wrapper without applying any TTL. Callers whose TTL
    /// depends on the payload itself (game status, roster status) classify
    /// from this before deciding freshness.
    pub async fn entry(
        &self,
        prefix: &str,
        identifier: &str,
    ) -> Result<Option<CacheEntry>, AppError> {
        let path = self.entry_path(prefix, identifier)?;
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheEntry>(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(
                    "Corrupt cache entry treated as miss: {} ({e})",
                    path.display()
                );
                Ok(None)
            }
        }
    }

    /// Writes a payload under the wrapper, atomically.
    pub async fn set(
        &self,
        prefix: &str,
        identifier: &str,
        data: &Value,
        metadata: Option<Value>,
    ) -> Result<(), AppError> {
        let path = self.entry_path(prefix, identifier)?;
        let entry = CacheEntry {
            timestamp: Utc::now().timestamp(),
            last_updated: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            data: data.clone(),
            metadata,
        };

        let temp_path = path.with_extension("json.tmp");
        let serialized = serde_json::to_vec_pretty(&entry)?;

        let write_result = async {
            fs::write(&temp_path, &serialized).await?;
            fs::rename(&temp_path, &path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = write_result {
            if fs::try_exists(&temp_path).await.unwrap_or(false) {
                if let Err(cleanup) = fs::remove_file(&temp_path).await {
                    error!(
                        "Failed to remove temp cache file {}: {cleanup}",
                        temp_path.display()
                    );
                }
            }
            return Err(e.into());
        }

        debug!("Cached {prefix}_{identifier} ({} bytes)", serialized.len());
        Ok(())
    }

    /// Removes a single entry, or all entries under a prefix older than the
    /// given age (all entries when no age is given).
    pub async fn clear(
        &self,
        prefix: &str,
        identifier: Option<&str>,
        older_than: Option<Duration>,
    ) -> Result<(), AppError> {
        if prefix.is_empty() {
            return Err(AppError::config_error("cache prefix must not be empty"));
        }

        if let Some(identifier) = identifier {
            let path = self.entry_path(prefix, identifier)?;
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!("Failed to remove cache entry {}: {e}", path.display());
                    return Err(e.into());
                }
            }
            return Ok(());
        }

        let file_prefix = format!("{prefix}_");
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&file_prefix) || !name.ends_with(".json") {
                continue;
            }

            let expired = match older_than {
                None => true,
                Some(age) => {
                    let content = match fs::read(dir_entry.path()).await {
                        Ok(content) => content,
                        Err(_) => continue,
                    };
                    match serde_json::from_slice::<CacheEntry>(&content) {
                        Ok(entry) => entry.age() > age,
                        // Corrupt entries are always removable.
                        Err(_) => true,
                    }
                }
            };

            if expired
                && let Err(e) = fs::remove_file(dir_entry.path()).await
            {
                error!(
                    "Failed to clear cache entry {}: {e}",
                    dir_entry.path().display()
                );
            }
        }

        Ok(())
    }
}
