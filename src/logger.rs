//! Audit logging for the bracket controller and the ladder stores.
//!
//! Both subsystems emit their audit trail through `tracing` (tournament
//! creation, series results, advancement, rating changes, persistence
//! problems). This module installs the file subscriber backing that trail:
//! one daily log file under `logs/` in the configured data directory,
//! opened in append mode so restarts on the same day keep writing to the
//! same file.

use std::fs::{self, OpenOptions};

use anyhow::Context;
use time::{format_description, OffsetDateTime};
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::Configuration;

/// Installs the process-wide audit logger for the configured data directory.
///
/// Events of level `INFO` and above are appended to
/// `<data_dir>/logs/arena-<year>-<month>-<day>.log`; the `logs` directory is
/// created if missing.
///
/// # Errors
/// Fails when the log directory or file cannot be opened, or when a global
/// `tracing` subscriber is already installed (embedders that set their own
/// subscriber should simply not call this).
pub fn init_logger(config: &Configuration) -> anyhow::Result<()> {
    let dir = config.log_dir();
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(daily_log_name());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .expect("static format description"),
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_target(false)
        .with_timer(timer)
        .with_writer(BoxMakeWriter::new(file))
        .finish();
    set_global_default(subscriber).context("a global tracing subscriber is already set")?;
    tracing::info!("audit log opened at {}", path.display());
    Ok(())
}

/// One file per day keeps the audit trail browsable without rotation tooling.
fn daily_log_name() -> String {
    let format = format_description::parse("arena-[year]-[month]-[day].log")
        .expect("static format description");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "arena.log".to_owned())
}
