use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::error::AppError;

/// Sets up logging to stdout and a daily-rolling log file.
///
/// Returns the log file path and the guard that must be kept alive for the
/// duration of the program so buffered log lines are flushed.
pub async fn setup_logging(
    config: &Config,
    verbose: bool,
) -> Result<(String, WorkerGuard), AppError> {
    let (log_dir, log_file_name) = match &config.log_file_path {
        Some(custom_path) => {
            let path = Path::new(custom_path);
            let parent = path.parent().unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("courtsync.log");
            (parent.to_string_lossy().to_string(), file_name.to_string())
        }
        None => (
            config.log_dir().to_string_lossy().to_string(),
            "courtsync.log".to_string(),
        ),
    };

    if !Path::new(&log_dir).exists() {
        tokio::fs::create_dir_all(&log_dir).await.map_err(|e| {
            AppError::log_setup_error(format!("Failed to create log directory: {e}"))
        })?;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, &log_file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let directive = format!("courtsync={default_level}")
        .parse()
        .map_err(|e| AppError::log_setup_error(format!("Invalid log directive: {e}")))?;

    tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env().add_directive(directive)),
        )
        .with(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_filter(EnvFilter::from_default_env().add_directive(
                    format!("courtsync={default_level}").parse().map_err(|e| {
                        AppError::log_setup_error(format!("Invalid log directive: {e}"))
                    })?,
                )),
        )
        .init();

    Ok((format!("{log_dir}/{log_file_name}"), guard))
}
