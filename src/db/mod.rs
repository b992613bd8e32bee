//! SQLite pool construction and schema initialization

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::AppError;

/// Opens (creating if missing) the SQLite database at the given path. The
/// pool is kept small: synchronizers hold the writer for the duration of
/// their transaction.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool, AppError> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// In-memory database sharing a single connection, for tests and dry runs.
pub async fn create_memory_pool() -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

const CREATE_TEAMS: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    team_id INTEGER PRIMARY KEY,
    abbreviation TEXT,
    nickname TEXT,
    year_founded INTEGER,
    city TEXT,
    arena TEXT,
    arena_capacity TEXT,
    owner TEXT,
    general_manager TEXT,
    head_coach TEXT,
    dleague_affiliation TEXT,
    team_slug TEXT,
    logo BLOB,
    updated_at TEXT
)
"#;

const CREATE_PLAYERS: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    person_id INTEGER PRIMARY KEY,
    display_last_comma_first TEXT,
    display_first_last TEXT NOT NULL,
    roster_status INTEGER,
    from_year TEXT,
    to_year TEXT,
    player_slug TEXT,
    team_id INTEGER REFERENCES teams(team_id),
    games_played_flag TEXT,
    updated_at TEXT
)
"#;

const CREATE_GAMES: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    game_id TEXT PRIMARY KEY,
    game_code TEXT,
    game_status INTEGER,
    game_status_text TEXT,
    game_date_est TEXT,
    game_time_est TEXT,
    game_date_time_est TEXT,
    game_date_utc TEXT,
    game_time_utc TEXT,
    game_date_time_utc TEXT,
    game_date TEXT,
    season_year TEXT,
    week_number INTEGER,
    week_name TEXT,
    series_game_number TEXT,
    if_necessary TEXT,
    series_text TEXT,
    arena_name TEXT,
    arena_city TEXT,
    arena_state TEXT,
    arena_is_neutral BOOLEAN,
    home_team_id INTEGER,
    home_team_name TEXT,
    home_team_city TEXT,
    home_team_tricode TEXT,
    home_team_slug TEXT,
    home_team_wins INTEGER,
    home_team_losses INTEGER,
    home_team_score INTEGER,
    home_team_seed INTEGER,
    away_team_id INTEGER,
    away_team_name TEXT,
    away_team_city TEXT,
    away_team_tricode TEXT,
    away_team_slug TEXT,
    away_team_wins INTEGER,
    away_team_losses INTEGER,
    away_team_score INTEGER,
    away_team_seed INTEGER,
    points_leader_id INTEGER,
    points_leader_first_name TEXT,
    points_leader_last_name TEXT,
    points_leader_team_id INTEGER,
    points_leader_points REAL,
    game_type TEXT,
    game_sub_type TEXT,
    game_label TEXT,
    game_sub_label TEXT,
    postponed_status TEXT,
    game_date_bjs TEXT,
    game_time_bjs TEXT,
    game_date_time_bjs TEXT,
    updated_at TEXT
)
"#;

const INDEXES: [&str; 13] = [
    "CREATE INDEX IF NOT EXISTS idx_teams_abbr ON teams (abbreviation)",
    "CREATE INDEX IF NOT EXISTS idx_teams_name ON teams (nickname, city)",
    "CREATE INDEX IF NOT EXISTS idx_players_name ON players (display_first_last)",
    "CREATE INDEX IF NOT EXISTS idx_players_team ON players (team_id)",
    "CREATE INDEX IF NOT EXISTS idx_players_status ON players (roster_status)",
    "CREATE INDEX IF NOT EXISTS idx_players_slug ON players (player_slug)",
    "CREATE INDEX IF NOT EXISTS idx_games_date ON games (game_date)",
    "CREATE INDEX IF NOT EXISTS idx_games_season ON games (season_year)",
    "CREATE INDEX IF NOT EXISTS idx_games_teams ON games (home_team_id, away_team_id)",
    "CREATE INDEX IF NOT EXISTS idx_games_status ON games (game_status)",
    "CREATE INDEX IF NOT EXISTS idx_games_date_utc ON games (game_date_time_utc)",
    "CREATE INDEX IF NOT EXISTS idx_games_date_bjs ON games (game_date_bjs)",
    "CREATE INDEX IF NOT EXISTS idx_games_type ON games (game_type)",
];

/// Creates the three tables and their indexes. Safe to call repeatedly.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    for ddl in [CREATE_TEAMS, CREATE_PLAYERS, CREATE_GAMES] {
        sqlx::query(ddl).execute(pool).await?;
    }
    for index in INDEXES {
        sqlx::query(index).execute(pool).await?;
    }
    info!("Database schema initialized");
    Ok(())
}
