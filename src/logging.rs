//! Logging configuration using tracing.
//!
//! The terminal belongs to the dashboard, so logs go to a file.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `<cache dir>/markettop/markettop.log`
pub fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("markettop").join("markettop.log"))
}

/// Build the level filter: `RUST_LOG` wins, otherwise INFO (DEBUG when
/// verbose). HTTP internals stay at WARN.
pub fn env_filter(verbose: bool) -> Result<EnvFilter> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("hyper=warn".parse().context("Invalid log directive")?)
        .add_directive("reqwest=warn".parse().context("Invalid log directive")?);
    Ok(filter)
}

/// Install the global subscriber, appending to `path`.
pub fn init(path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter(verbose)?)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}
