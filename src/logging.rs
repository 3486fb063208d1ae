//! Debug logging to a file.
//!
//! The TUI owns the terminal, so nothing may go to stderr. Logging is off
//! unless `BOTDESK_LOG=<path>` is set; the filter comes from
//! `BOTDESK_LOG_LEVEL` (default `botdesk=debug`).

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "botdesk=debug";

pub fn init() -> Result<()> {
    let Ok(path) = std::env::var("BOTDESK_LOG") else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path))?;

    let filter = std::env::var("BOTDESK_LOG_LEVEL")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
    Ok(())
}
