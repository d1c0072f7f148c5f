//! Log sinks: console, append-only activity log and append-only error log

use crate::config::LoggingConfig;

use anyhow::{Context, Result};
use tracing::{Level, Metadata};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    fmt::{self, time::ChronoUtc},
    prelude::*,
    EnvFilter,
};

/// Keeps the file writers alive; dropping it flushes both logs
pub struct LogGuards {
    _activity: WorkerGuard,
    _errors: WorkerGuard,
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuards> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.dir))?;

    // `never` appenders open in append mode
    let activity_appender = tracing_appender::rolling::never(&config.dir, &config.log_file);
    let error_appender = tracing_appender::rolling::never(&config.dir, &config.error_log_file);
    let (activity_writer, activity_guard) = tracing_appender::non_blocking(activity_appender);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tea_disburser=info,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_target(false)
                .with_writer(activity_writer)
                .with_filter(filter_fn(is_activity)),
        )
        .with(
            fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_target(false)
                .with_writer(error_writer)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuards {
        _activity: activity_guard,
        _errors: error_guard,
    })
}

/// Everything at INFO or above except errors, which have their own file
fn is_activity(metadata: &Metadata<'_>) -> bool {
    let level = *metadata.level();
    level != Level::ERROR && level <= Level::INFO && is_own_event(metadata)
}

fn is_own_event(metadata: &Metadata<'_>) -> bool {
    let target = metadata.target();
    target.starts_with("tea_disburser") || target == "disbursement"
}

