//! Yahoo Finance quote source.
//!
//! Stock quotes and the market summary both come from the v7 quote
//! endpoint; daily history comes from the v8 chart endpoint.

use super::{ProviderError, QuoteSource};
use crate::models::{DailyRecord, Direction, MarketData, MarketIndex, Quote};
use crate::numeric::format_compact;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Pretending to be a real browser because Yahoo has trust issues.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Symbols behind each market summary slot.
const MARKET_SYMBOLS: [&str; 12] = [
    "^DJI", "^GSPC", "^IXIC", "^N225", "^HSI", "^FTSE", "^GDAXI", "^TNX", "EURUSD=X", "JPY=X",
    "CL=F", "GC=F",
];

pub struct YahooFinance {
    client: Client,
}

impl YahooFinance {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        debug!(url, "GET");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn raw_quotes(&self, symbols: &[&str]) -> Result<Vec<YahooQuote>, ProviderError> {
        let symbols_param = symbols
            .iter()
            .map(|s| urlencoding::encode(s))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{QUOTE_URL}?symbols={symbols_param}");

        let data: YahooResponse = self.get_json(&url).await?;
        Ok(data.quote_response.result)
    }
}

impl QuoteSource for YahooFinance {
    async fn fetch_quotes(&self, tickers: &[String]) -> Result<Vec<Quote>, ProviderError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let symbols: Vec<&str> = tickers.iter().map(String::as_str).collect();
        let quotes = self
            .raw_quotes(&symbols)
            .await?
            .into_iter()
            .map(YahooQuote::into_quote)
            .collect();
        Ok(quotes)
    }

    async fn fetch_market(&self) -> Result<MarketData, ProviderError> {
        let raw = self.raw_quotes(&MARKET_SYMBOLS).await?;
        if raw.is_empty() {
            return Err(ProviderError::Empty("market summary".to_string()));
        }
        Ok(market_from(raw))
    }

    async fn fetch_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyRecord>, ProviderError> {
        let start = from.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp());
        let end = to.and_hms_opt(23, 59, 59).map(|d| d.and_utc().timestamp());
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(Vec::new());
        };
        let url = format!(
            "{CHART_URL}/{}?period1={start}&period2={end}&interval=1d",
            urlencoding::encode(ticker)
        );

        let data: ChartResponse = self.get_json(&url).await?;
        let result = data
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ProviderError::Empty(ticker.to_string()))?;
        Ok(result.into_records())
    }
}

// Yahoo Finance API response structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooResponse {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_volume: Option<f64>,
    average_daily_volume3_month: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    trailing_annual_dividend_rate: Option<f64>,
    trailing_annual_dividend_yield: Option<f64>,
    market_cap: Option<f64>,
    pre_market_change_percent: Option<f64>,
    post_market_change_percent: Option<f64>,
    currency: Option<String>,
    market_state: Option<String>,
}

fn fixed(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}

fn signed(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:+.2}"))
}

fn compact(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), format_compact)
}

impl YahooQuote {
    fn into_quote(self) -> Quote {
        Quote {
            direction: Direction::from_change(self.regular_market_change.unwrap_or(0.0)),
            last_trade: fixed(self.regular_market_price),
            change: signed(self.regular_market_change),
            change_percent: signed(self.regular_market_change_percent),
            open: fixed(self.regular_market_open),
            low: fixed(self.regular_market_day_low),
            high: fixed(self.regular_market_day_high),
            low52: fixed(self.fifty_two_week_low),
            high52: fixed(self.fifty_two_week_high),
            volume: compact(self.regular_market_volume),
            avg_volume: compact(self.average_daily_volume3_month),
            pe_ratio: fixed(self.trailing_pe),
            dividend: fixed(self.trailing_annual_dividend_rate),
            dividend_yield: fixed(self.trailing_annual_dividend_yield.map(|y| y * 100.0)),
            market_cap: compact(self.market_cap),
            pre_open: signed(self.pre_market_change_percent),
            after_hours: signed(self.post_market_change_percent),
            currency: self.currency.unwrap_or_else(|| "USD".to_string()),
            ticker: self.symbol,
        }
    }

    fn into_index(self, name: &str) -> MarketIndex {
        MarketIndex {
            name: name.to_string(),
            latest: fixed(self.regular_market_price),
            change: signed(self.regular_market_change),
            percent: self
                .regular_market_change_percent
                .map_or_else(String::new, |p| format!("{p:+.2}%")),
        }
    }
}

fn market_from(raw: Vec<YahooQuote>) -> MarketData {
    let mut by_symbol: HashMap<String, YahooQuote> =
        raw.into_iter().map(|q| (q.symbol.clone(), q)).collect();
    let closed = by_symbol
        .get("^DJI")
        .and_then(|q| q.market_state.as_deref())
        .is_none_or(|state| state != "REGULAR");

    let defaults = MarketData::default();
    let mut index = |symbol: &str, slot: &MarketIndex| match by_symbol.remove(symbol) {
        Some(quote) => quote.into_index(&slot.name),
        None => slot.clone(),
    };

    MarketData {
        closed,
        dow: index("^DJI", &defaults.dow),
        sp500: index("^GSPC", &defaults.sp500),
        nasdaq: index("^IXIC", &defaults.nasdaq),
        tokyo: index("^N225", &defaults.tokyo),
        hong_kong: index("^HSI", &defaults.hong_kong),
        london: index("^FTSE", &defaults.london),
        frankfurt: index("^GDAXI", &defaults.frankfurt),
        yield_10y: index("^TNX", &defaults.yield_10y),
        euro: index("EURUSD=X", &defaults.euro),
        yen: index("JPY=X", &defaults.yen),
        oil: index("CL=F", &defaults.oil),
        gold: index("GC=F", &defaults.gold),
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChartQuote {
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

impl ChartResult {
    /// Days with a missing high, low, or volume are skipped.
    fn into_records(self) -> Vec<DailyRecord> {
        let Some(series) = self.indicators.quote.into_iter().next() else {
            return Vec::new();
        };
        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let date = DateTime::from_timestamp(ts, 0)?.date_naive();
                Some(DailyRecord {
                    date,
                    high: (*series.high.get(i)?)?,
                    low: (*series.low.get(i)?)?,
                    volume: (*series.volume.get(i)?)?,
                })
            })
            .collect()
    }
}
