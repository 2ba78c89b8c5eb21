//! Logging System
//!
//! One append-only log file per user with `<timestamp> <LEVEL>: <message>`
//! lines, plus an optional compact console layer for diagnostics.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "New-ToastNotification.log";

/// Size at which the log is rotated on startup
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Rotated files kept next to the live log
const KEEP_ROTATED: usize = 2;

/// `%APPDATA%\ToastNotificationScript`, else `logs` next to the EXE
pub fn default_log_dir() -> PathBuf {
    if let Some(app_data) = std::env::var_os("APPDATA") {
        return PathBuf::from(app_data).join("ToastNotificationScript");
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join("logs");
        }
    }
    PathBuf::from(".").join("logs")
}

/// Line layout of the log file
struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(
            writer,
            "{} {}: ",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initializes file (and optionally console) logging.
///
/// The returned guard flushes the file writer on drop and must be held
/// until the process exits.
pub fn init_logger(log_dir: &Path, console: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("could not create log directory {}", log_dir.display()))?;

    let rotated = rotate_oversized(log_dir, MAX_LOG_BYTES);
    let removed = cleanup_old_logs(log_dir, KEEP_ROTATED, &format!("{}.", LOG_FILE_NAME));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(log_dir)
        .with_context(|| format!("could not open the log file in {}", log_dir.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = console.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(LineFormat),
        )
        .with(console_layer)
        .with(filter)
        .init();

    match rotated {
        Ok(Some(path)) => info!("Previous log rotated to {}", path.display()),
        Ok(None) => {}
        Err(e) => error!("Could not rotate the log file: {}", e),
    }
    for path in removed {
        info!("Old log file deleted: {}", path.display());
    }

    Ok(guard)
}

/// Console-only logger, used when the log directory is unusable
pub fn init_console_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(filter)
        .init();

    Ok(())
}

/// Logs who and where this run is
pub fn log_run_header() {
    info!("{}", "=".repeat(60));
    info!(
        "Toast notifier {} started on {} as {}",
        env!("CARGO_PKG_VERSION"),
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default(),
        std::env::var("USERNAME").unwrap_or_default()
    );
}

/// Renames the live log aside once it exceeds `max_bytes`
fn rotate_oversized(log_dir: &Path, max_bytes: u64) -> io::Result<Option<PathBuf>> {
    let live = log_dir.join(LOG_FILE_NAME);
    let size = match fs::metadata(&live) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(None);
    }

    let rotated = log_dir.join(format!(
        "{}.{}",
        LOG_FILE_NAME,
        Local::now().format("%Y%m%d-%H%M%S")
    ));
    fs::rename(&live, &rotated)?;
    Ok(Some(rotated))
}

/// Deletes old log files with specific prefix, keeps only the newest N
fn cleanup_old_logs(log_dir: &Path, keep_count: usize, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return Vec::new();
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix))
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| {
        let time_a = a.metadata().and_then(|m| m.modified()).ok();
        let time_b = b.metadata().and_then(|m| m.modified()).ok();
        time_b.cmp(&time_a)
    });

    log_files
        .iter()
        .skip(keep_count)
        .map(|entry| entry.path())
        .filter(|path| fs::remove_file(path).is_ok())
        .collect()
}
