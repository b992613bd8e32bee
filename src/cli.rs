use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .usage(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Yellow.on_default())
        .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// NBA game-data sync engine
///
/// Ingests schedules, teams, and players from the vendor API into a local
/// SQLite store, with a file cache and resumable batch jobs in between.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(styles = get_styles())]
pub struct Args {
    /// Initialize the database and, on first run, bootstrap teams, players,
    /// and the current season's schedule.
    #[arg(long)]
    pub init: bool,

    /// Sync one resource kind: teams, players, schedule, or all.
    #[arg(long, value_name = "KIND")]
    pub sync: Option<String>,

    /// Force-refresh caches and re-sync even when data already exists.
    #[arg(short, long)]
    pub force: bool,

    /// Full refresh for a new season. Optionally pass the season
    /// (e.g. 2025-26); defaults to the configured current season.
    #[arg(
        long = "new-season",
        value_name = "SEASON",
        num_args = 0..=1,
        default_missing_value = ""
    )]
    pub new_season: Option<String>,

    /// Sweep schedules for every season from the configured start season.
    #[arg(long = "all-seasons")]
    pub all_seasons: bool,

    /// List current configuration settings.
    #[arg(long = "list-config", short = 'l')]
    pub list_config: bool,

    /// Enable debug-level logging.
    #[arg(long)]
    pub verbose: bool,
}
