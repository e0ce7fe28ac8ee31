//! Logging setup: daily file plus stderr, with cleanup of old log files.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const LOG_RETENTION_DAYS: u64 = 7;
const LOG_PREFIX: &str = "quelta";

fn current_log_path(log_dir: &Path) -> PathBuf {
    let today = chrono::Local::now().format("%Y-%m-%d");
    log_dir.join(format!("{}.{}.log", LOG_PREFIX, today))
}

fn cleanup_old_logs(log_dir: &Path) -> Result<()> {
    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !filename.starts_with(LOG_PREFIX) || !filename.ends_with(".log") {
            continue;
        }
        if entry.metadata()?.modified()? < cutoff {
            if let Err(err) = fs::remove_file(&path) {
                eprintln!("Failed to delete old log {}: {}", path.display(), err);
            }
        }
    }
    Ok(())
}

pub struct LoggingGuard {
    _guard: WorkerGuard,
}

pub fn init_logging(log_dir: &Path, log_level: &str) -> Result<LoggingGuard> {
    fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir)?;

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(current_log_path(log_dir))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let env_filter = |level: &str| {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter(log_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_filter(env_filter(log_level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(LoggingGuard { _guard: guard })
}
