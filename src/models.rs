//! Data models for quotes, market indices, and daily history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sign of a quote's price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    Declining,
    #[default]
    Flat,
    Advancing,
}

impl Direction {
    /// Derive the direction from a signed change value.
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            Direction::Advancing
        } else if change < 0.0 {
            Direction::Declining
        } else {
            Direction::Flat
        }
    }

    /// Signed integer form (-1, 0, +1) as exposed to filter expressions.
    pub fn signum(self) -> i64 {
        match self {
            Direction::Declining => -1,
            Direction::Flat => 0,
            Direction::Advancing => 1,
        }
    }
}

/// A single row of the quotes grid.
///
/// Providers hand these over already formatted as strings; only the sorter and
/// the filter parse them back into numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol (e.g., "AAPL")
    pub ticker: String,
    /// Last trade price
    pub last_trade: String,
    /// Change from previous close
    pub change: String,
    /// Percentage change from previous close
    pub change_percent: String,
    /// Opening price for the day
    pub open: String,
    /// Day's low
    pub low: String,
    /// Day's high
    pub high: String,
    /// 52-week low
    pub low52: String,
    /// 52-week high
    pub high52: String,
    /// Trading volume, compact form ("12.3M")
    pub volume: String,
    /// Average volume, compact form
    pub avg_volume: String,
    /// Price/earnings ratio
    pub pe_ratio: String,
    /// Annual dividend
    pub dividend: String,
    /// Dividend yield
    pub dividend_yield: String,
    /// Market capitalization, compact form ("2.85T")
    pub market_cap: String,
    /// Pre-market change percent
    pub pre_open: String,
    /// After-hours change percent
    pub after_hours: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// Sign of the change
    pub direction: Direction,
}

/// Latest values for one tracked index, commodity, or currency pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIndex {
    pub name: String,
    pub latest: String,
    pub change: String,
    pub percent: String,
}

impl MarketIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Market-wide summary shown above the quotes grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    /// True when U.S. markets are closed
    pub closed: bool,
    pub dow: MarketIndex,
    pub sp500: MarketIndex,
    pub nasdaq: MarketIndex,
    pub tokyo: MarketIndex,
    pub hong_kong: MarketIndex,
    pub london: MarketIndex,
    pub frankfurt: MarketIndex,
    pub yield_10y: MarketIndex,
    pub euro: MarketIndex,
    pub yen: MarketIndex,
    pub oil: MarketIndex,
    pub gold: MarketIndex,
}

impl Default for MarketData {
    fn default() -> Self {
        Self {
            closed: false,
            dow: MarketIndex::new("Dow"),
            sp500: MarketIndex::new("S&P 500"),
            nasdaq: MarketIndex::new("NASDAQ"),
            tokyo: MarketIndex::new("Tokyo"),
            hong_kong: MarketIndex::new("HK"),
            london: MarketIndex::new("London"),
            frankfurt: MarketIndex::new("Frankfurt"),
            yield_10y: MarketIndex::new("10-Year Yield"),
            euro: MarketIndex::new("Euro"),
            yen: MarketIndex::new("Yen"),
            oil: MarketIndex::new("Oil"),
            gold: MarketIndex::new("Gold"),
        }
    }
}

/// One trading day of history used for 52-week aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn is_ascending(self) -> bool {
        self == SortDirection::Ascending
    }
}
