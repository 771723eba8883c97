//! Configuration file handling with TOML support.
//!
//! The config file holds settings that rarely change: network timeout,
//! history cache pacing, extra markup colors and where to log. Everything
//! the dashboard changes at runtime lives in the profile instead.

use crate::provider::history::WarmUpOptions;
use anyhow::{Context, Result, anyhow, bail};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Daily history cache
    #[serde(default)]
    pub history: HistoryConfig,

    /// Extra markup colors, tag name to color
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// API timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Log file; defaults to the cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Quote refresh interval such as `"5s"`; overrides the profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotes_refresh: Option<String>,

    /// Market refresh interval such as `"12s"`; overrides the profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_refresh: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            log_file: None,
            quotes_refresh: None,
            market_refresh: None,
        }
    }
}

fn default_timeout() -> u64 {
    10
}

impl GeneralConfig {
    /// The `(quotes, market)` refresh intervals, where set.
    pub fn refresh_intervals(&self) -> Result<(Option<Duration>, Option<Duration>)> {
        Ok((
            parse_interval("quotes_refresh", self.quotes_refresh.as_deref())?,
            parse_interval("market_refresh", self.market_refresh.as_deref())?,
        ))
    }
}

fn parse_interval(key: &str, value: Option<&str>) -> Result<Option<Duration>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let duration = humantime::parse_duration(value)
        .with_context(|| format!("Invalid {key} '{value}' in [general]"))?;
    if duration.is_zero() {
        bail!("{key} in [general] must be greater than zero");
    }
    Ok(Some(duration))
}

/// History cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds to wait before each history request
    #[serde(default = "default_request_delay")]
    pub request_delay: f64,

    /// Hours before a cached entry is refreshed
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_delay: default_request_delay(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_request_delay() -> f64 {
    5.0
}
fn default_max_age_hours() -> u64 {
    24
}

impl HistoryConfig {
    pub fn warm_up_options(&self) -> WarmUpOptions {
        WarmUpOptions {
            request_delay: Duration::try_from_secs_f64(self.request_delay.max(0.0))
                .unwrap_or_else(|_| WarmUpOptions::default().request_delay),
            max_age: Duration::from_secs(self.max_age_hours.saturating_mul(60 * 60)),
        }
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from default location or create default.
    pub fn load_or_default() -> Self {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to load config: {e:#}");
                    }
                }
            }
        }
        Config::default()
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("markettop").join("config.toml"))
    }

    /// The `[colors]` table parsed into terminal colors.
    ///
    /// Accepts anything ratatui understands: names (`lightblue`), indexed
    /// (`208`) and hex (`#ff8800`).
    pub fn colors(&self) -> Result<BTreeMap<String, Color>> {
        self.colors
            .iter()
            .map(|(name, value)| {
                let color = Color::from_str(value)
                    .map_err(|_| anyhow!("Invalid color '{value}' for tag <{name}>"))?;
                Ok((name.to_lowercase(), color))
            })
            .collect()
    }
}

/// Generate a sample configuration file content.
pub fn sample_config() -> &'static str {
    r##"# markettop configuration file
# Tickers, sort order and the filter live in the profile, not here.

[general]
# API timeout in seconds
timeout = 10
# log_file = "/tmp/markettop.log"
# Refresh intervals; these win over the profile, command line flags win over both
# quotes_refresh = "5s"
# market_refresh = "12s"

[history]
# Keep a year of daily prices to fill in missing 52-week ranges
enabled = true
# Seconds between history requests
request_delay = 5.0
# Refresh cached history after this many hours
max_age_hours = 24

[colors]
# Extra markup tags, usable in the display as <name>...</>
orange = "#ff8800"
sky = "lightblue"
"##
}
