//! File-based logging with daily rotation plus a console layer, mirroring
//! the desktop app's rolling-file setup but adapted to a headless binary
//! with its own data directory instead of the OS app-data path.

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_DIRECTORY: OnceLock<PathBuf> = OnceLock::new();

pub fn get_log_directory() -> Option<PathBuf> {
    LOG_DIRECTORY.get().cloned()
}

pub fn init(data_dir: &std::path::Path) -> anyhow::Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let _ = LOG_DIRECTORY.set(log_dir.clone());

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("guardian-hub")
        .filename_suffix("log")
        .max_log_files(7)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    std::mem::forget(guard);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!(log_dir = %log_dir.display(), "hub logging initialized");
    Ok(())
}

pub fn logs_total_size() -> anyhow::Result<u64> {
    let log_dir = get_log_directory().ok_or_else(|| anyhow::anyhow!("log directory not initialized"))?;
    let mut total = 0u64;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
