//! Local daily-history cache for 52-week ranges and average volume.
//!
//! Some instruments come back from the quote service without 52-week or
//! average-volume figures. The cache keeps a year of daily records per
//! ticker on disk, tops it up incrementally in the background, and derives
//! the missing aggregates from it.

use super::QuoteSource;
use crate::models::DailyRecord;
use crate::numeric::format_compact;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Records older than this are pruned.
const RETENTION_DAYS: i64 = 365;

/// Cached history and aggregates for one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub records: Vec<DailyRecord>,
    pub high52: String,
    pub low52: String,
    pub avg_volume: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.last_updated {
            Some(updated) => now
                .signed_duration_since(updated)
                .to_std()
                .map(|age| age < max_age)
                .unwrap_or(true),
            None => false,
        }
    }

    /// Recompute the aggregate strings from the records.
    fn recompute(&mut self) {
        if self.records.is_empty() {
            self.high52 = "-".to_string();
            self.low52 = "-".to_string();
            self.avg_volume = "-".to_string();
            return;
        }
        let high = self
            .records
            .iter()
            .map(|r| r.high)
            .fold(f64::MIN, f64::max);
        let low = self
            .records
            .iter()
            .map(|r| r.low)
            .fold(f64::MAX, f64::min);
        let volume: f64 = self.records.iter().map(|r| r.volume).sum();

        self.high52 = format!("{high:.2}");
        self.low52 = format!("{low:.2}");
        self.avg_volume = format_compact(volume / self.records.len() as f64);
    }
}

/// Append records newer than the last one held, sort by date, and drop
/// anything before `cutoff`.
pub fn merge_records(
    mut existing: Vec<DailyRecord>,
    incoming: Vec<DailyRecord>,
    cutoff: NaiveDate,
) -> Vec<DailyRecord> {
    let last = existing.iter().map(|r| r.date).max();
    existing.extend(
        incoming
            .into_iter()
            .filter(|r| last.is_none_or(|last| r.date > last)),
    );
    existing.sort_by_key(|r| r.date);
    existing.dedup_by_key(|r| r.date);
    existing.retain(|r| r.date >= cutoff);
    existing
}

/// Pacing for the background warm-up.
#[derive(Debug, Clone, Copy)]
pub struct WarmUpOptions {
    /// Pause before each service request
    pub request_delay: Duration,
    /// Entries updated more recently than this are skipped
    pub max_age: Duration,
}

impl Default for WarmUpOptions {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(5),
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Removes the ticker from the in-flight set however the fetch ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    ticker: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        super::lock(self.set).remove(&self.ticker);
    }
}

pub struct HistoryCache {
    entries: Mutex<HashMap<String, HistoryEntry>>,
    in_flight: Mutex<HashSet<String>>,
    /// Serializes writers of the cache file
    file: Mutex<()>,
    path: Option<PathBuf>,
}

impl HistoryCache {
    /// In-memory only.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            file: Mutex::new(()),
            path: None,
        }
    }

    /// Load from `path`. A missing or unreadable file starts an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Starting with an empty history cache");
                HashMap::new()
            }
        };
        debug!(path = %path.display(), tickers = entries.len(), "Loaded history cache");

        Self {
            entries: Mutex::new(entries),
            in_flight: Mutex::new(HashSet::new()),
            file: Mutex::new(()),
            path: Some(path),
        }
    }

    /// Get the default cache path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|p| p.join("markettop").join("history.json"))
    }

    pub fn get(&self, ticker: &str) -> Option<HistoryEntry> {
        super::lock(&self.entries).get(ticker).cloned()
    }

    /// Update the map, then persist a copy of it on the blocking pool so
    /// readers never wait on the disk.
    async fn store(self: &Arc<Self>, ticker: &str, entry: HistoryEntry) -> Result<()> {
        super::lock(&self.entries).insert(ticker.to_string(), entry);
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let cache = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            // Copy inside the file lock so the last write holds the newest map.
            let _file = super::lock(&cache.file);
            let snapshot = super::lock(&cache.entries).clone();
            write_entries(&path, &snapshot)
        })
        .await
        .context("History cache writer stopped")?
    }

    fn begin(&self, ticker: &str) -> Option<InFlight<'_>> {
        if !super::lock(&self.in_flight).insert(ticker.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            ticker: ticker.to_string(),
        })
    }

    /// Bring every ticker's history up to date, one request at a time.
    ///
    /// Fresh entries and tickers already being fetched are skipped. Each
    /// ticker fails independently. Setting `cancel` stops the loop before
    /// the next request.
    pub async fn warm_up<S, F>(
        self: Arc<Self>,
        source: Arc<S>,
        tickers: Vec<String>,
        options: WarmUpOptions,
        cancel: Arc<AtomicBool>,
        on_update: F,
    ) where
        S: QuoteSource,
        F: Fn(&str) + Send + Sync + 'static,
    {
        for ticker in tickers {
            if cancel.load(Ordering::Relaxed) {
                debug!("History warm-up cancelled");
                return;
            }

            let cached = self.get(&ticker);
            if cached
                .as_ref()
                .is_some_and(|entry| entry.is_fresh(options.max_age, Utc::now()))
            {
                continue;
            }
            let Some(_guard) = self.begin(&ticker) else {
                continue;
            };

            tokio::time::sleep(options.request_delay).await;
            if cancel.load(Ordering::Relaxed) {
                debug!("History warm-up cancelled");
                return;
            }

            let today = Local::now().date_naive();
            let cutoff = today - TimeDelta::days(RETENTION_DAYS);
            let mut entry = cached.unwrap_or_default();
            let from = entry
                .records
                .last()
                .and_then(|r| r.date.succ_opt())
                .unwrap_or(cutoff)
                .max(cutoff);

            if from <= today {
                match source.fetch_history(&ticker, from, today).await {
                    Ok(records) => {
                        debug!(ticker = %ticker, records = records.len(), %from, "Fetched history");
                        entry.records = merge_records(entry.records, records, cutoff);
                    }
                    Err(e) => {
                        warn!(ticker = %ticker, error = %e, "History fetch failed");
                        continue;
                    }
                }
            }

            entry.recompute();
            entry.last_updated = Some(Utc::now());
            if let Err(e) = self.store(&ticker, entry).await {
                warn!(ticker = %ticker, error = %e, "Failed to save history cache");
            }
            on_update(&ticker);
        }
        info!("History warm-up finished");
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, HistoryEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history cache: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history cache: {}", path.display()))
}

fn write_entries(path: &Path, entries: &HashMap<String, HistoryEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string(entries).context("Failed to serialize history cache")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write history cache: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::FakeSource;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn day(offset: i64) -> NaiveDate {
        Local::now().date_naive() - TimeDelta::days(offset)
    }

    fn record(offset: i64, high: f64, low: f64, volume: f64) -> DailyRecord {
        DailyRecord {
            date: day(offset),
            high,
            low,
            volume,
        }
    }

    fn fast() -> WarmUpOptions {
        WarmUpOptions {
            request_delay: Duration::ZERO,
            ..WarmUpOptions::default()
        }
    }

    #[test]
    fn test_merge_appends_only_newer_and_prunes() {
        let existing = vec![record(400, 1.0, 1.0, 1.0), record(3, 2.0, 2.0, 2.0)];
        let incoming = vec![record(3, 9.0, 9.0, 9.0), record(2, 3.0, 3.0, 3.0)];
        let merged = merge_records(existing, incoming, day(365));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].high, 2.0);
        assert_eq!(merged[1].date, day(2));
    }

    #[test]
    fn test_recompute_aggregates() {
        let mut entry = HistoryEntry {
            records: vec![
                record(3, 110.0, 95.0, 1_000_000.0),
                record(2, 120.5, 99.0, 3_000_000.0),
            ],
            ..HistoryEntry::default()
        };
        entry.recompute();
        assert_eq!(entry.high52, "120.50");
        assert_eq!(entry.low52, "95.00");
        assert_eq!(entry.avg_volume, "2.00M");
    }

    #[tokio::test]
    async fn test_warm_up_fetches_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let cache = Arc::new(HistoryCache::open(&path));
        let source = Arc::new(FakeSource {
            history: vec![record(10, 50.0, 40.0, 500.0), record(9, 55.0, 45.0, 700.0)],
            ..FakeSource::default()
        });
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);

        Arc::clone(&cache)
            .warm_up(
                Arc::clone(&source),
                vec!["AAPL".into()],
                fast(),
                Arc::new(AtomicBool::new(false)),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(updates.load(Ordering::SeqCst), 1);
        let entry = cache.get("AAPL").unwrap();
        assert_eq!(entry.high52, "55.00");
        assert_eq!(entry.low52, "40.00");
        assert_eq!(entry.avg_volume, "600");

        let reloaded = HistoryCache::open(&path);
        assert_eq!(reloaded.get("AAPL").unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_disk_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let cache = Arc::new(HistoryCache::open(&path));

        // Stall the writer as a slow disk would.
        let file = cache.file.lock().unwrap();
        let writer = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.store("AAPL", HistoryEntry::default()).await }
        });
        for _ in 0..100 {
            if cache.get("AAPL").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cache.get("AAPL").is_some());
        assert!(!path.exists());

        drop(file);
        writer.await.unwrap().unwrap();
        assert!(HistoryCache::open(&path).get("AAPL").is_some());
    }

    #[tokio::test]
    async fn test_fresh_entries_are_skipped() {
        let cache = Arc::new(HistoryCache::new());
        cache
            .store(
                "IBM",
                HistoryEntry {
                    last_updated: Some(Utc::now()),
                    ..HistoryEntry::default()
                },
            )
            .await
            .unwrap();
        let source = Arc::new(FakeSource::default());

        Arc::clone(&cache)
            .warm_up(
                Arc::clone(&source),
                vec!["IBM".into()],
                fast(),
                Arc::new(AtomicBool::new(false)),
                |_| {},
            )
            .await;

        assert_eq!(source.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_warm_up_makes_no_requests() {
        let cache = Arc::new(HistoryCache::new());
        let source = Arc::new(FakeSource::default());

        Arc::clone(&cache)
            .warm_up(
                Arc::clone(&source),
                vec!["A".into(), "B".into()],
                fast(),
                Arc::new(AtomicBool::new(true)),
                |_| {},
            )
            .await;

        assert_eq!(source.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_are_per_ticker() {
        let cache = Arc::new(HistoryCache::new());
        let source = Arc::new(FakeSource {
            fail: true,
            ..FakeSource::default()
        });

        Arc::clone(&cache)
            .warm_up(
                Arc::clone(&source),
                vec!["A".into(), "B".into()],
                fast(),
                Arc::new(AtomicBool::new(false)),
                |_| {},
            )
            .await;

        assert_eq!(source.history_calls.load(Ordering::SeqCst), 2);
        assert!(cache.get("A").is_none());
    }

    #[test]
    fn test_in_flight_guard_releases() {
        let cache = HistoryCache::new();
        let guard = cache.begin("AAPL").unwrap();
        assert!(cache.begin("AAPL").is_none());
        drop(guard);
        assert!(cache.begin("AAPL").is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = HistoryCache::open(&path);
        assert!(cache.get("AAPL").is_none());
    }
}
