// src/main.rs
#![recursion_limit = "256"]

mod cache;
mod cli;
mod config;
mod constants;
mod db;
mod error;
mod fetcher;
mod http;
mod logging;
mod repository;
mod sync;

use clap::Parser;
use cli::Args;
use config::Config;
use error::AppError;
use sync::{SyncKind, SyncManager, SyncReport};

fn print_report(label: &str, report: &SyncReport) {
    println!("{label}: {}", report.status);
    let mut counts: Vec<_> = report.counts.iter().collect();
    counts.sort_by_key(|(name, _)| name.to_string());
    for (name, count) in counts {
        println!("  {name}: {count}");
    }
    for error in &report.errors {
        eprintln!("  error: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    if args.list_config {
        return Config::display().await;
    }

    let config = Config::load().await?;
    let (log_file_path, _guard) = logging::setup_logging(&config, args.verbose).await?;
    tracing::info!("Logs are being written to: {log_file_path}");

    let pool = db::create_pool(&config.db_path()).await?;
    db::init_schema(&pool).await?;

    let manager = SyncManager::new(&config, pool)?;

    if args.init {
        if manager.is_first_run().await? || args.force {
            let report = manager.initial_data_sync().await;
            print_report("initial sync", &report);
        } else {
            println!("Database already populated; nothing to do.");
        }
        return Ok(());
    }

    if let Some(season) = &args.new_season {
        let season = if season.is_empty() {
            None
        } else {
            Some(season.as_str())
        };
        let report = manager.new_season_sync(season).await;
        print_report("new-season sync", &report);
        return Ok(());
    }

    if args.all_seasons {
        let results = manager
            .schedule()
            .sync_all_seasons(None, args.force)
            .await?;
        let mut seasons: Vec<_> = results.iter().collect();
        seasons.sort_by_key(|(season, _)| season.to_string());
        println!("season sweep: {} seasons", seasons.len());
        for (season, count) in seasons {
            println!("  {season}: {count}");
        }
        return Ok(());
    }

    if let Some(kind) = &args.sync {
        let kind: SyncKind = kind.parse()?;
        let report = manager.sync(kind, args.force || config.force_refresh).await;
        print_report("sync", &report);
        return Ok(());
    }

    // Default action: daily incremental refresh of the current season.
    let report = manager.sync_current_season().await;
    print_report("schedule sync", &report);
    Ok(())
}
