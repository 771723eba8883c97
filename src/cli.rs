//! Command-line interface.
//!
//! Most of the interesting state lives in the profile; the flags here pick
//! which profile to use and tweak the session around it.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// A live terminal dashboard for stock quotes and market indices.
/// Watch the tape without leaving your shell.
///
/// markettop shows the major market indices on top and a sortable,
/// filterable table of your tickers below, refreshing both on their own
/// timers. Press `?` inside the dashboard for the list of keys.
#[derive(Parser, Debug, Clone)]
#[command(name = "markettop")]
#[command(version)]
#[command(about = "A live terminal dashboard for stock quotes and market indices", long_about = None)]
pub struct Args {
    /// Profile file holding tickers, sort order, filter and refresh intervals
    #[arg(short = 'p', long, env = "MARKETTOP_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "MARKETTOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Tickers to add to the profile (comma-separated)
    ///
    /// Example: MSFT,TSLA,NVDA
    #[arg(short = 's', long, value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    /// Quote refresh interval for this session, e.g. `10s` or `1m`
    #[arg(long, value_parser = parse_duration)]
    pub quotes_refresh: Option<Duration>,

    /// Market summary refresh interval for this session
    #[arg(long, value_parser = parse_duration)]
    pub market_refresh: Option<Duration>,

    /// API timeout in seconds (overrides the config file)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not fetch or show daily history
    #[arg(long)]
    pub no_history: bool,

    /// Write logs here instead of the default cache location
    #[arg(long, env = "MARKETTOP_LOG")]
    pub log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub sample_config: bool,
}

impl Args {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Upper-cased `--symbols`, blanks dropped.
    pub fn tickers(&self) -> Vec<String> {
        self.symbols
            .iter()
            .flatten()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("refresh interval must be greater than zero".to_string());
    }
    Ok(duration)
}
