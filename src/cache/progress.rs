//! Persistent per-task progress records for resumable batch jobs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressMetadata {
    started_at: String,
    last_updated: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    completed_ids: Vec<String>,
    failed_ids: HashMap<String, String>,
    metadata: ProgressMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stats: Option<ProgressStats>,
}

/// Counts exposed for progress logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub progress: String,
    pub completion_percentage: f64,
}

/// Tracks which item ids a batch task has completed or failed, persisted as
/// `batch_{task}_progress.json` under the cache root. Re-running a task
/// skips ids already completed; a later success clears an earlier failure.
#[derive(Debug)]
pub struct ProgressTracker {
    task_name: String,
    path: PathBuf,
    completed_ids: HashSet<String>,
    failed_ids: HashMap<String, String>,
    metadata: ProgressMetadata,
}

impl ProgressTracker {
    /// Loads existing progress for the task, or starts fresh. A malformed
    /// progress file is logged and treated as empty, restarting the task
    /// from scratch.
    pub async fn load(task_name: &str, cache_root: &Path) -> Result<Self, AppError> {
        let path = cache_root.join(format!("batch_{task_name}_progress.json"));
        let now = Local::now().to_rfc3339();

        let mut tracker = ProgressTracker {
            task_name: task_name.to_string(),
            path,
            completed_ids: HashSet::new(),
            failed_ids: HashMap::new(),
            metadata: ProgressMetadata {
                started_at: now.clone(),
                last_updated: now,
            },
        };

        match fs::read(&tracker.path).await {
            Ok(content) => match serde_json::from_slice::<ProgressFile>(&content) {
                Ok(file) => {
                    tracker.completed_ids = file.completed_ids.into_iter().collect();
                    tracker.failed_ids = file.failed_ids;
                    tracker.metadata = file.metadata;
                    info!(
                        "Loaded progress for task {}: {} completed, {} failed",
                        task_name,
                        tracker.completed_ids.len(),
                        tracker.failed_ids.len()
                    );
                }
                Err(e) => {
                    warn!(
                        "Malformed progress file for task {task_name}, restarting from scratch: {e}"
                    );
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(tracker)
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Persists progress atomically (temp-then-rename).
    pub async fn save(&mut self) -> Result<(), AppError> {
        self.metadata.last_updated = Local::now().to_rfc3339();

        let file = ProgressFile {
            completed_ids: self.completed_ids.iter().cloned().collect(),
            failed_ids: self.failed_ids.clone(),
            metadata: self.metadata.clone(),
            stats: Some(self.stats()),
        };

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_vec_pretty(&file)?).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Marks an id completed, clearing any earlier failure.
    pub fn mark_completed(&mut self, id: &str) {
        self.completed_ids.insert(id.to_string());
        self.failed_ids.remove(id);
    }

    pub fn mark_failed(&mut self, id: &str, error: &str) {
        if !self.completed_ids.contains(id) {
            self.failed_ids.insert(id.to_string(), error.to_string());
        }
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed_ids.contains(id)
    }

    /// Ids not yet completed, in their original list order so that resumed
    /// runs process the remainder deterministically.
    pub fn pending_ids(&self, all_ids: &[String]) -> Vec<String> {
        all_ids
            .iter()
            .filter(|id| !self.completed_ids.contains(*id))
            .cloned()
            .collect()
    }

    pub fn failed_ids(&self) -> &HashMap<String, String> {
        &self.failed_ids
    }

    pub fn stats(&self) -> ProgressStats {
        let completed = self.completed_ids.len();
        let failed = self.failed_ids.len();
        let total = completed + failed;
        let percentage = if total > 0 {
            (completed as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        ProgressStats {
            total,
            completed,
            failed,
            progress: if total > 0 {
                format!("{completed}/{total}")
            } else {
                "0/0".to_string()
            },
            completion_percentage: percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::load("player_info_batch", dir.path())
            .await
            .unwrap();
        tracker.mark_completed("2544");
        tracker.mark_completed("201939");
        tracker.mark_failed("76001", "empty payload");
        tracker.save().await.unwrap();

        let reloaded = ProgressTracker::load("player_info_batch", dir.path())
            .await
            .unwrap();
        assert!(reloaded.is_completed("2544"));
        assert!(reloaded.is_completed("201939"));
        assert_eq!(
            reloaded.failed_ids().get("76001").map(String::as_str),
            Some("empty payload")
        );
    }

    #[tokio::test]
    async fn test_completed_and_failed_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::load("t", dir.path()).await.unwrap();
        tracker.mark_failed("7", "boom");
        tracker.mark_completed("7");
        assert!(tracker.is_completed("7"));
        assert!(!tracker.failed_ids().contains_key("7"));

        // A failure after completion does not reopen the id.
        tracker.mark_failed("7", "late error");
        assert!(!tracker.failed_ids().contains_key("7"));
    }

    #[tokio::test]
    async fn test_pending_ids_preserve_input_order() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::load("t", dir.path()).await.unwrap();
        tracker.mark_completed("3");

        let all: Vec<String> = ["5", "3", "1", "4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tracker.pending_ids(&all), vec!["5", "1", "4"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_restarts_from_scratch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("batch_t_progress.json"), b"]]not json").unwrap();

        let tracker = ProgressTracker::load("t", dir.path()).await.unwrap();
        assert_eq!(tracker.stats().total, 0);
    }

    #[tokio::test]
    async fn test_stats_percentage() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::load("t", dir.path()).await.unwrap();
        tracker.mark_completed("1");
        tracker.mark_completed("2");
        tracker.mark_completed("3");
        tracker.mark_failed("4", "x");

        let stats = tracker.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.progress, "3/4");
        assert!((stats.completion_percentage - 75.0).abs() < f64::EPSILON);
    }
}
