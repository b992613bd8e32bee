//! Synchronizers and the top-level sync orchestrator

pub mod player;
pub mod schedule;
pub mod team;

pub use player::PlayerSync;
pub use schedule::ScheduleSync;
pub use team::TeamSync;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::error::AppError;
use crate::fetcher::league::LeagueFetcher;
use crate::fetcher::schedule::{ScheduleFetcher, ScheduleSettings};
use crate::fetcher::team::TeamFetcher;
use crate::http::{HttpClient, HttpSettings};

/// URL-safe lowercase identifier from a display name.
pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    Skipped,
}

/// Result of one synchronizer run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub count: u64,
    pub status: SyncStatus,
}

/// What to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Teams,
    Players,
    Schedule,
    All,
}

impl FromStr for SyncKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "teams" => Ok(SyncKind::Teams),
            "players" => Ok(SyncKind::Players),
            "schedule" => Ok(SyncKind::Schedule),
            "all" => Ok(SyncKind::All),
            other => Err(AppError::config_error(format!(
                "unknown sync kind '{other}' (expected teams, players, schedule, or all)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Success,
    Error,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Success => write!(f, "success"),
            ReportStatus::Error => write!(f, "error"),
        }
    }
}

/// Summary surfaced to callers of the sync entry points. No error escapes
/// the manager; failures land in `errors` with the status set accordingly.
#[derive(Debug)]
pub struct SyncReport {
    pub status: ReportStatus,
    pub counts: HashMap<String, u64>,
    pub errors: Vec<String>,
}

impl SyncReport {
    fn new() -> Self {
        SyncReport {
            status: ReportStatus::Success,
            counts: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn record(&mut self, name: &str, result: Result<SyncOutcome, AppError>) {
        match result {
            Ok(outcome) => {
                self.counts.insert(name.to_string(), outcome.count);
            }
            Err(e) => {
                error!("Sync step {name} failed: {e}");
                self.errors.push(format!("{name}: {e}"));
                self.status = ReportStatus::Error;
            }
        }
    }
}

/// Top-level orchestrator: first-run bootstrap, incremental daily sync, and
/// seasonal full refresh.
#[derive(Debug)]
pub struct SyncManager {
    pool: SqlitePool,
    schedule_sync: ScheduleSync,
    team_sync: TeamSync,
    player_sync: PlayerSync,
}

impl SyncManager {
    /// Wires up the fetcher stack from configuration. The pool must already
    /// have the schema initialized.
    pub fn new(config: &Config, pool: SqlitePool) -> Result<Self, AppError> {
        let http = Arc::new(HttpClient::new(HttpSettings::from_config(config))?);

        let schedule_fetcher = ScheduleFetcher::new(
            config,
            ScheduleSettings::from_config(config),
            http.clone(),
        )?;
        let league_fetcher = LeagueFetcher::new(config, http.clone())?;
        let team_fetcher = TeamFetcher::new(config, http.clone())?;

        Ok(SyncManager {
            pool: pool.clone(),
            schedule_sync: ScheduleSync::new(pool.clone(), schedule_fetcher),
            team_sync: TeamSync::new(
                pool.clone(),
                LeagueFetcher::new(config, http.clone())?,
                team_fetcher,
                http,
            ),
            player_sync: PlayerSync::new(pool, league_fetcher),
        })
    }

    /// Assembles a manager from prebuilt parts (used by tests to point the
    /// fetchers at mock servers).
    pub fn from_parts(
        pool: SqlitePool,
        schedule_sync: ScheduleSync,
        team_sync: TeamSync,
        player_sync: PlayerSync,
    ) -> Self {
        SyncManager {
            pool,
            schedule_sync,
            team_sync,
            player_sync,
        }
    }

    pub fn schedule(&self) -> &ScheduleSync {
        &self.schedule_sync
    }

    pub fn teams(&self) -> &TeamSync {
        &self.team_sync
    }

    pub fn players(&self) -> &PlayerSync {
        &self.player_sync
    }

    /// True iff any of the three tables is empty.
    pub async fn is_first_run(&self) -> Result<bool, AppError> {
        for table in ["teams", "players", "games"] {
            let count: (i64,) = sqlx::query_as(&format!("SELECT count(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            if count.0 == 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Bootstrap sync in dependency order: teams, then players (which
    /// reference teams), then the current season's schedule.
    #[instrument(skip(self))]
    pub async fn initial_data_sync(&self) -> SyncReport {
        info!("Running initial data sync");
        let mut report = SyncReport::new();
        report.record("teams", self.team_sync.sync_details(false).await);
        report.record("players", self.player_sync.sync(false).await);
        report.record(
            "schedule",
            self.schedule_sync.sync_current_season(false).await,
        );
        report
    }

    /// Seasonal full refresh: force-update all three resources.
    #[instrument(skip(self))]
    pub async fn new_season_sync(&self, season: Option<&str>) -> SyncReport {
        info!("Running new-season sync (season={season:?})");
        let mut report = SyncReport::new();
        report.record("teams", self.team_sync.sync_details(true).await);
        report.record("players", self.player_sync.sync(true).await);
        let schedule_result = match season {
            Some(season) => self.schedule_sync.sync_season(season, true).await,
            None => self.schedule_sync.sync_current_season(true).await,
        };
        report.record("schedule", schedule_result);
        report
    }

    /// Daily refresh of the current season's schedule only.
    #[instrument(skip(self))]
    pub async fn sync_current_season(&self) -> SyncReport {
        let mut report = SyncReport::new();
        report.record(
            "schedule",
            self.schedule_sync.sync_current_season(true).await,
        );
        report
    }

    /// On-demand sync of one resource kind.
    #[instrument(skip(self))]
    pub async fn sync(&self, kind: SyncKind, force: bool) -> SyncReport {
        match kind {
            SyncKind::Teams => {
                let mut report = SyncReport::new();
                report.record("teams", self.team_sync.sync_details(force).await);
                report
            }
            SyncKind::Players => {
                let mut report = SyncReport::new();
                report.record("players", self.player_sync.sync(force).await);
                report
            }
            SyncKind::Schedule => {
                let mut report = SyncReport::new();
                report.record(
                    "schedule",
                    self.schedule_sync.sync_current_season(force).await,
                );
                report
            }
            SyncKind::All => self.new_season_sync(None).await,
        }
    }
}
