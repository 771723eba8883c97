//! Quote providers and the shared caches the UI reads from.
//!
//! A [`QuoteSource`] knows how to talk to a market data service. [`Market`]
//! and [`Quotes`] wrap one and own the latest result behind a lock: `fetch`
//! starts a background request and returns immediately, `snapshot` hands the
//! renderer a consistent copy of whatever arrived last.

pub mod history;
pub mod yahoo;

use crate::models::{DailyRecord, MarketData, Quote};
use crate::profile::Profile;
use anyhow::Result;
use chrono::NaiveDate;
use history::HistoryCache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned HTTP {0}")]
    Status(u16),

    #[error("no data returned for {0}")]
    Empty(String),
}

/// A market data service.
pub trait QuoteSource: Send + Sync + 'static {
    fn fetch_quotes(
        &self,
        tickers: &[String],
    ) -> impl Future<Output = Result<Vec<Quote>, ProviderError>> + Send;

    fn fetch_market(&self) -> impl Future<Output = Result<MarketData, ProviderError>> + Send;

    /// Daily records for `ticker` between `from` and `to`, inclusive.
    fn fetch_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = Result<Vec<DailyRecord>, ProviderError>> + Send;
}

/// Callback invoked from a background task after new data lands.
pub type OnUpdate = Arc<dyn Fn() + Send + Sync>;

/// A poisoned lock only means a fetch task panicked mid-update; the data is
/// still a complete snapshot, so keep going.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Blank provider fields that history can fill in.
pub fn is_blank(value: &str) -> bool {
    matches!(value.trim(), "" | "N/A" | "-")
}

// ---------------------------------------------------------------------------
// Market summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub data: MarketData,
    pub error: Option<String>,
}

impl MarketSnapshot {
    pub fn ok(&self) -> Result<(), &str> {
        match &self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.data.closed
    }
}

pub struct Market<S> {
    source: Arc<S>,
    state: Arc<Mutex<MarketSnapshot>>,
    on_update: Option<OnUpdate>,
}

impl<S: QuoteSource> Market<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(MarketSnapshot::default())),
            on_update: None,
        }
    }

    pub fn bind_on_update(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_update = Some(Arc::new(callback));
    }

    /// Request fresh market data in the background.
    pub fn fetch(&self) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let on_update = self.on_update.clone();

        tokio::spawn(async move {
            let result = source.fetch_market().await;
            {
                let mut state = lock(&state);
                match result {
                    Ok(data) => {
                        state.data = data;
                        state.error = None;
                    }
                    Err(e) => {
                        warn!(error = %e, "Market fetch failed");
                        state.error = Some(format!("Error fetching market data: {e}"));
                    }
                }
            }
            if let Some(callback) = on_update {
                callback();
            }
        })
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        lock(&self.state).clone()
    }
}

// ---------------------------------------------------------------------------
// Stock quotes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct QuotesSnapshot {
    pub stocks: Vec<Quote>,
    pub error: Option<String>,
}

impl QuotesSnapshot {
    pub fn ok(&self) -> Result<(), &str> {
        match &self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct QuotesState {
    snapshot: QuotesSnapshot,
    /// Sequence number of the request whose result is shown
    applied: u64,
}

pub struct Quotes<S> {
    source: Arc<S>,
    state: Arc<Mutex<QuotesState>>,
    requests: Arc<AtomicU64>,
    history: Option<Arc<HistoryCache>>,
    on_update: Option<OnUpdate>,
}

impl<S: QuoteSource> Quotes<S> {
    pub fn new(source: Arc<S>, history: Option<Arc<HistoryCache>>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(QuotesState::default())),
            requests: Arc::new(AtomicU64::new(0)),
            history,
            on_update: None,
        }
    }

    pub fn bind_on_update(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_update = Some(Arc::new(callback));
    }

    /// Request quotes for `tickers` in the background.
    ///
    /// Responses are applied in request order; a slow response never
    /// overwrites a newer one.
    pub fn fetch(&self, tickers: Vec<String>) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let on_update = self.on_update.clone();
        let sequence = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::spawn(async move {
            let result = if tickers.is_empty() {
                Ok(Vec::new())
            } else {
                source.fetch_quotes(&tickers).await
            };
            {
                let mut state = lock(&state);
                if sequence < state.applied {
                    debug!(sequence, applied = state.applied, "Dropping stale quotes response");
                    return;
                }
                state.applied = sequence;
                match result {
                    Ok(stocks) => {
                        state.snapshot.stocks = stocks;
                        state.snapshot.error = None;
                    }
                    Err(e) => {
                        warn!(error = %e, "Quotes fetch failed");
                        state.snapshot.error = Some(format!("Error fetching stock quotes: {e}"));
                    }
                }
            }
            if let Some(callback) = on_update {
                callback();
            }
        })
    }

    /// Copy of the latest quotes with history filling blank 52-week fields.
    pub fn snapshot(&self) -> QuotesSnapshot {
        let mut snapshot = lock(&self.state).snapshot.clone();
        if let Some(history) = &self.history {
            for quote in &mut snapshot.stocks {
                let Some(entry) = history.get(&quote.ticker) else {
                    continue;
                };
                if is_blank(&quote.high52) {
                    quote.high52 = entry.high52.clone();
                }
                if is_blank(&quote.low52) {
                    quote.low52 = entry.low52.clone();
                }
                if is_blank(&quote.avg_volume) {
                    quote.avg_volume = entry.avg_volume.clone();
                }
            }
        }
        snapshot
    }

    /// Add to the profile and refetch when anything new was added.
    pub fn add_tickers(&self, profile: &mut Profile, tickers: &[String]) -> Result<usize> {
        let added = profile.add_tickers(tickers)?;
        if added > 0 {
            self.fetch(profile.tickers().to_vec());
        }
        Ok(added)
    }

    /// Remove from the profile and drop the rows right away.
    pub fn remove_tickers(&self, profile: &mut Profile, tickers: &[String]) -> Result<usize> {
        let removed = profile.remove_tickers(tickers)?;
        if removed > 0 {
            lock(&self.state)
                .snapshot
                .stocks
                .retain(|q| !tickers.contains(&q.ticker));
        }
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::{Direction, MarketIndex};
    use std::sync::atomic::AtomicUsize;

    /// Canned responses; counts history requests.
    #[derive(Default)]
    pub struct FakeSource {
        pub fail: bool,
        pub history_calls: AtomicUsize,
        pub history: Vec<DailyRecord>,
    }

    pub fn quote(ticker: &str, last: &str, change: &str, pct: &str) -> Quote {
        Quote {
            ticker: ticker.to_string(),
            last_trade: last.to_string(),
            change: change.to_string(),
            change_percent: pct.to_string(),
            open: last.to_string(),
            low: last.to_string(),
            high: last.to_string(),
            low52: "N/A".to_string(),
            high52: "N/A".to_string(),
            volume: "1.00M".to_string(),
            avg_volume: "N/A".to_string(),
            pe_ratio: "20.00".to_string(),
            dividend: "0.00".to_string(),
            dividend_yield: "N/A".to_string(),
            market_cap: "1.00B".to_string(),
            pre_open: "N/A".to_string(),
            after_hours: "N/A".to_string(),
            currency: "USD".to_string(),
            direction: Direction::from_change(crate::numeric::parse_number(change)),
        }
    }

    impl QuoteSource for FakeSource {
        async fn fetch_quotes(&self, tickers: &[String]) -> Result<Vec<Quote>, ProviderError> {
            if self.fail {
                return Err(ProviderError::Status(503));
            }
            Ok(tickers
                .iter()
                .map(|t| quote(t, "100.00", "1.00", "1.00"))
                .collect())
        }

        async fn fetch_market(&self) -> Result<MarketData, ProviderError> {
            if self.fail {
                return Err(ProviderError::Status(503));
            }
            let mut data = MarketData::default();
            data.dow = MarketIndex {
                latest: "38,000.00".into(),
                change: "+120.50".into(),
                percent: "+0.32%".into(),
                ..MarketIndex::new("Dow")
            };
            Ok(data)
        }

        async fn fetch_history(
            &self,
            ticker: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<DailyRecord>, ProviderError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Empty(ticker.to_string()));
            }
            Ok(self.history.clone())
        }
    }
}
