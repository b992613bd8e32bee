//! NBA game-data acquisition and persistence core
//!
//! This library ingests schedules, teams, players, per-game boxscore and
//! play-by-play payloads, and highlight-video manifests from the vendor's
//! HTTP endpoints, caches raw payloads on disk, and persists normalized
//! rows in a local SQLite store. Batch jobs checkpoint their progress so
//! interrupted sweeps resume where they left off.
//!
//! # Examples
//!
//! ```rust,no_run
//! use courtsync::config::Config;
//! use courtsync::db;
//! use courtsync::sync::SyncManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load().await?;
//!     let pool = db::create_pool(&config.db_path()).await?;
//!     db::init_schema(&pool).await?;
//!
//!     let manager = SyncManager::new(&config, pool)?;
//!     if manager.is_first_run().await? {
//!         let report = manager.initial_data_sync().await;
//!         println!("bootstrap: {}", report.status);
//!     }
//!     Ok(())
//! }
//! ```

#![recursion_limit = "256"]

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod logging;
pub mod repository;
pub mod sync;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::AppError;
pub use fetcher::game::GameFetcher;
pub use fetcher::schedule::ScheduleFetcher;
pub use fetcher::video::{ContextMeasure, VideoFetcher};
pub use repository::{GameRepository, PlayerRepository, TeamRepository};
pub use sync::{SyncKind, SyncManager, SyncReport};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
