//! Persisted user settings: tickers, refresh intervals, sort and filter.
//!
//! Every mutation is written back through a [`ProfileStore`] right away so
//! the next session starts where this one left off.

use crate::filter::{Filter, FilterError};
use crate::models::{Quote, SortDirection};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Minimum refresh interval to avoid hammering the quote service.
const MIN_REFRESH: Duration = Duration::from_secs(1);

fn default_tickers() -> Vec<String> {
    ["AAPL", "C", "GOOG", "IBM", "KO", "ORCL", "V"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_quotes_refresh() -> u64 {
    5
}

fn default_market_refresh() -> u64 {
    12
}

/// The serialized form of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Watched ticker symbols, kept sorted
    pub tickers: Vec<String>,
    /// Quotes refresh interval in seconds
    pub quotes_refresh: u64,
    /// Market summary refresh interval in seconds
    pub market_refresh: u64,
    /// Index of the sort column
    pub sort_column: usize,
    pub sort_direction: SortDirection,
    /// Advancing rows first, then declining
    pub grouped: bool,
    /// Filter expression; empty means no filter
    pub filter: String,
    /// Show the clock above the quotes grid
    pub show_timestamp: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tickers: default_tickers(),
            quotes_refresh: default_quotes_refresh(),
            market_refresh: default_market_refresh(),
            sort_column: 0,
            sort_direction: SortDirection::Ascending,
            grouped: false,
            filter: String::new(),
            show_timestamp: false,
        }
    }
}

/// Where settings are read from and written to.
pub trait ProfileStore: Send {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Settings>>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// TOML file store, `~/.config/markettop/profile.toml` by default.
#[derive(Debug, Clone)]
pub struct TomlProfileStore {
    path: PathBuf,
}

impl TomlProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Get the default profile path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("markettop").join("profile.toml"))
    }
}

impl ProfileStore for TomlProfileStore {
    fn load(&self) -> Result<Option<Settings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read profile: {}", self.path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", self.path.display()))?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(settings).context("Failed to serialize profile")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write profile: {}", self.path.display()))?;
        Ok(())
    }
}

/// Settings plus the session state derived from them.
pub struct Profile {
    settings: Settings,
    filter: Filter,
    /// Column highlighted by the column editor
    selected_column: Option<usize>,
    quotes_refresh_override: Option<Duration>,
    market_refresh_override: Option<Duration>,
    store: Box<dyn ProfileStore>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("settings", &self.settings)
            .field("filter", &self.filter)
            .field("selected_column", &self.selected_column)
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Load from the store, writing defaults if nothing was saved yet.
    pub fn load(store: Box<dyn ProfileStore>) -> Result<Self> {
        let settings = match store.load()? {
            Some(settings) => settings,
            None => {
                let settings = Settings::default();
                store.save(&settings)?;
                settings
            }
        };
        Ok(Self::with_settings(settings, store))
    }

    /// A saved filter that no longer compiles stays visible until the
    /// first `apply_filter` clears it.
    fn with_settings(mut settings: Settings, store: Box<dyn ProfileStore>) -> Self {
        let filter = Filter::new(&settings.filter);
        settings.tickers.sort();
        settings.tickers.dedup();

        Self {
            settings,
            filter,
            selected_column: None,
            quotes_refresh_override: None,
            market_refresh_override: None,
            store,
        }
    }

    #[cfg(test)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tickers(&self) -> &[String] {
        &self.settings.tickers
    }

    pub fn quotes_refresh(&self) -> Duration {
        self.quotes_refresh_override
            .unwrap_or(Duration::from_secs(self.settings.quotes_refresh))
            .max(MIN_REFRESH)
    }

    pub fn market_refresh(&self) -> Duration {
        self.market_refresh_override
            .unwrap_or(Duration::from_secs(self.settings.market_refresh))
            .max(MIN_REFRESH)
    }

    /// Session-only refresh intervals; not written back.
    pub fn override_refresh(&mut self, quotes: Option<Duration>, market: Option<Duration>) {
        if quotes.is_some() {
            self.quotes_refresh_override = quotes;
        }
        if market.is_some() {
            self.market_refresh_override = market;
        }
    }

    pub fn sort_column(&self) -> usize {
        self.settings.sort_column
    }

    pub fn is_ascending(&self) -> bool {
        self.settings.sort_direction.is_ascending()
    }

    pub fn is_grouped(&self) -> bool {
        self.settings.grouped
    }

    pub fn show_timestamp(&self) -> bool {
        self.settings.show_timestamp
    }

    pub fn selected_column(&self) -> Option<usize> {
        self.selected_column
    }

    pub fn select_column(&mut self, column: Option<usize>) {
        self.selected_column = column;
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Add tickers not already present. Returns how many were added.
    pub fn add_tickers(&mut self, tickers: &[String]) -> Result<usize> {
        let before = self.settings.tickers.len();
        for ticker in tickers {
            if !self.settings.tickers.contains(ticker) {
                self.settings.tickers.push(ticker.clone());
            }
        }
        let added = self.settings.tickers.len() - before;
        if added > 0 {
            self.settings.tickers.sort();
            self.save()?;
        }
        Ok(added)
    }

    /// Remove every listed ticker. Returns how many were removed.
    pub fn remove_tickers(&mut self, tickers: &[String]) -> Result<usize> {
        let before = self.settings.tickers.len();
        self.settings.tickers.retain(|t| !tickers.contains(t));
        let removed = before - self.settings.tickers.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    /// Apply the column editor's selection: the same column flips the
    /// direction, a different one becomes the sort column.
    pub fn reorder(&mut self) -> Result<()> {
        let Some(selected) = self.selected_column else {
            return Ok(());
        };
        if selected == self.settings.sort_column {
            self.settings.sort_direction = self.settings.sort_direction.toggle();
        } else {
            self.settings.sort_column = selected;
        }
        self.save()
    }

    pub fn regroup(&mut self) -> Result<()> {
        self.settings.grouped = !self.settings.grouped;
        self.save()
    }

    pub fn toggle_timestamp(&mut self) -> Result<()> {
        self.settings.show_timestamp = !self.settings.show_timestamp;
        self.save()
    }

    /// Compile and store a filter. An invalid expression leaves no filter.
    pub fn set_filter(&mut self, expression: &str) -> std::result::Result<(), FilterError> {
        let result = Filter::try_new(expression);
        self.filter = match &result {
            Ok(filter) => filter.clone(),
            Err(_) => Filter::default(),
        };
        self.settings.filter = self.filter.source().to_string();
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "Failed to save profile");
        }
        result.map(|_| ())
    }

    /// Run the filter over a quote set. The second value is true when the
    /// filter failed and was cleared during this call.
    pub fn apply_filter(&mut self, quotes: Vec<Quote>) -> (Vec<Quote>, bool) {
        let was_active = self.filter.is_active();
        let kept = self.filter.apply(quotes);
        let reset = was_active && !self.filter.is_active();
        if reset {
            self.settings.filter.clear();
            if let Err(e) = self.save() {
                tracing::warn!(error = %e, "Failed to save profile");
            }
        }
        (kept, reset)
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.settings)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory store that exposes what was last saved.
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        pub saved: Arc<Mutex<Option<Settings>>>,
    }

    impl ProfileStore for MemoryStore {
        fn load(&self) -> Result<Option<Settings>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn save(&self, settings: &Settings) -> Result<()> {
            *self.saved.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    pub fn profile_with(settings: Settings) -> Profile {
        Profile::with_settings(settings, Box::new(MemoryStore::default()))
    }

    pub fn profile() -> Profile {
        profile_with(Settings::default())
    }
}
