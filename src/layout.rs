//! Turns market and quote snapshots into markup text.
//!
//! The quotes grid is driven by a single column table: each entry knows its
//! width, title, where its value comes from, and how to format it. Rows go
//! through filter, format, sort, and optional grouping, in that order.
//!
//! Quote text layout, by line:
//!
//! ```text
//! 0      optional clock, right-aligned
//! 1-2    blank (market summary shows through)
//! 3      blank (line editor prompt)
//! 4      column header
//! 5..    one line per quote
//! ```

use crate::models::{Direction, MarketIndex, Quote};
use crate::numeric::currency_symbol;
use crate::profile::Profile;
use crate::provider::{MarketSnapshot, QuotesSnapshot};
use crate::sorter::Sorter;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;

/// Row where the line editor prompts for input.
pub const PROMPT_ROW: usize = 3;
/// Row holding the quotes column header.
pub const HEADER_ROW: usize = 4;

/// Narrowest the ticker column ever gets.
const MIN_TICKER_WIDTH: usize = 7;

const ARROW_UP: char = '\u{2191}';
const ARROW_DOWN: char = '\u{2193}';

/// Grid columns, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnId {
    Ticker,
    LastTrade,
    Change,
    ChangePct,
    Open,
    Low,
    High,
    Low52,
    High52,
    Volume,
    AvgVolume,
    PeRatio,
    Dividend,
    Yield,
    MarketCap,
    PreOpen,
    AfterHours,
}

impl ColumnId {
    pub const ALL: [ColumnId; 17] = [
        ColumnId::Ticker,
        ColumnId::LastTrade,
        ColumnId::Change,
        ColumnId::ChangePct,
        ColumnId::Open,
        ColumnId::Low,
        ColumnId::High,
        ColumnId::Low52,
        ColumnId::High52,
        ColumnId::Volume,
        ColumnId::AvgVolume,
        ColumnId::PeRatio,
        ColumnId::Dividend,
        ColumnId::Yield,
        ColumnId::MarketCap,
        ColumnId::PreOpen,
        ColumnId::AfterHours,
    ];
}

/// `(raw value, currency code) -> display text`
type Formatter = fn(&str, &str) -> String;
type Accessor = fn(&Quote) -> &str;

struct Column {
    id: ColumnId,
    /// Negative widths are left-justified.
    width: i32,
    title: &'static str,
    accessor: Accessor,
    formatter: Formatter,
}

impl Column {
    fn new(
        id: ColumnId,
        width: i32,
        title: &'static str,
        accessor: Accessor,
        formatter: Formatter,
    ) -> Self {
        Self {
            id,
            width,
            title,
            accessor,
            formatter,
        }
    }
}

/// A quote plus its formatted, padded cells in column order.
#[derive(Debug, Clone)]
pub struct Row {
    pub quote: Quote,
    pub cells: Vec<String>,
}

impl Row {
    pub fn cell(&self, column: ColumnId) -> &str {
        self.cells
            .get(column as usize)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Rendered quotes text plus what the screen needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotesView {
    pub text: String,
    /// Line index of the column header within `text`
    pub header_line: usize,
    /// The filter failed and was cleared while rendering
    pub filter_reset: bool,
}

pub struct Layout {
    columns: Vec<Column>,
    sorter: Sorter,
    fraction: Regex,
    ticker_width: usize,
}

impl Layout {
    pub fn new() -> Result<Self> {
        Ok(Self {
            columns: column_table(),
            sorter: Sorter::new(),
            fraction: Regex::new(r"(\.\d+)[KMBT]?$").context("Failed to build fraction pattern")?,
            ticker_width: MIN_TICKER_WIDTH,
        })
    }

    pub fn total_columns(&self) -> usize {
        self.columns.len()
    }

    /// Three summary lines. An error replaces them verbatim.
    pub fn render_market(&self, snapshot: &MarketSnapshot) -> String {
        if let Err(error) = snapshot.ok() {
            return error.to_string();
        }
        let m = &snapshot.data;

        let mut second = [&m.tokyo, &m.hong_kong, &m.london, &m.frankfurt]
            .map(index)
            .join(", ");
        if snapshot.is_closed() {
            second.push_str("<right>U.S. markets closed</right>");
        }

        [
            [&m.dow, &m.sp500, &m.nasdaq].map(index).join(", "),
            second,
            [&m.yield_10y, &m.euro, &m.yen, &m.oil, &m.gold]
                .map(index)
                .join(", "),
        ]
        .join("\n")
    }

    /// Filter, format, sort, and group the quotes into grid text.
    pub fn render_quotes(
        &mut self,
        snapshot: &QuotesSnapshot,
        profile: &mut Profile,
        now: DateTime<Local>,
    ) -> QuotesView {
        let mut lines = vec![String::new(); HEADER_ROW];
        if profile.show_timestamp() {
            lines[0] = timestamp(now);
        }

        if let Err(error) = snapshot.ok() {
            lines.push(error.to_string());
            return QuotesView {
                text: lines.join("\n"),
                header_line: HEADER_ROW,
                filter_reset: false,
            };
        }

        let (quotes, filter_reset) = profile.apply_filter(snapshot.stocks.clone());

        self.ticker_width = quotes
            .iter()
            .map(|q| q.ticker.chars().count() + 1)
            .fold(MIN_TICKER_WIDTH, usize::max);

        let mut rows: Vec<Row> = quotes.into_iter().map(|q| self.format_row(q)).collect();
        self.sorter
            .sort(&mut rows, profile.sort_column(), profile.is_ascending());
        let sorted_by_change = matches!(
            ColumnId::ALL.get(profile.sort_column()),
            Some(ColumnId::Change | ColumnId::ChangePct)
        );
        if profile.is_grouped() && !sorted_by_change {
            rows = group(rows);
        }

        lines.push(self.header(profile));
        lines.extend(rows.iter().map(row_line));

        QuotesView {
            text: lines.join("\n"),
            header_line: HEADER_ROW,
            filter_reset,
        }
    }

    /// Underlined column titles; the sort column carries an arrow and the
    /// column editor's selection is reversed.
    pub fn header(&self, profile: &Profile) -> String {
        let mut text = String::from("<u>");
        for (i, column) in self.columns.iter().enumerate() {
            let title = if i == profile.sort_column() {
                let arrow = if profile.is_ascending() { ARROW_UP } else { ARROW_DOWN };
                format!("{arrow}{}", column.title)
            } else {
                column.title.to_string()
            };
            let cell = justify(&title, self.width_of(column));
            if profile.selected_column() == Some(i) {
                text.push_str(&format!("<r>{cell}</r>"));
            } else {
                text.push_str(&cell);
            }
        }
        text.push_str("</u>");
        text
    }

    fn width_of(&self, column: &Column) -> i32 {
        match column.id {
            ColumnId::Ticker => -(self.ticker_width as i32),
            _ => column.width,
        }
    }

    fn format_row(&self, quote: Quote) -> Row {
        let cells = self
            .columns
            .iter()
            .map(|column| {
                let raw = (column.accessor)(&quote);
                let text = (column.formatter)(raw, &quote.currency);
                self.pad(&text, self.width_of(column))
            })
            .collect();
        Row { quote, cells }
    }

    /// Normalize the fraction to two digits, then justify to `width`.
    ///
    /// A single fractional digit gains a trailing zero; three or four are
    /// cut to two.
    fn pad(&self, text: &str, width: i32) -> String {
        let mut text = text.to_string();
        if let Some(found) = self.fraction.captures(&text).and_then(|c| c.get(1)) {
            let (start, end) = (found.start(), found.end());
            match end - start {
                2 => text.insert(end, '0'),
                4 | 5 => text.replace_range(start + 3..end, ""),
                _ => {}
            }
        }
        justify(&text, width)
    }
}

fn column_table() -> Vec<Column> {
    use ColumnId::*;

    vec![
        Column::new(Ticker, -(MIN_TICKER_WIDTH as i32), "Ticker", |q| &q.ticker, plain),
        Column::new(LastTrade, 10, "Last", |q| &q.last_trade, last),
        Column::new(Change, 10, "Change", |q| &q.change, currency),
        Column::new(ChangePct, 10, "Change%", |q| &q.change_percent, percent),
        Column::new(Open, 10, "Open", |q| &q.open, currency),
        Column::new(Low, 10, "Low", |q| &q.low, currency),
        Column::new(High, 10, "High", |q| &q.high, currency),
        Column::new(Low52, 10, "52w Low", |q| &q.low52, currency),
        Column::new(High52, 10, "52w High", |q| &q.high52, currency),
        Column::new(Volume, 11, "Volume", |q| &q.volume, blank),
        Column::new(AvgVolume, 11, "AvgVolume", |q| &q.avg_volume, blank),
        Column::new(PeRatio, 9, "P/E", |q| &q.pe_ratio, blank),
        Column::new(Dividend, 9, "Dividend", |q| &q.dividend, blank_currency),
        Column::new(Yield, 9, "Yield", |q| &q.dividend_yield, percent),
        Column::new(MarketCap, 11, "MktCap", |q| &q.market_cap, currency),
        Column::new(PreOpen, 9, "PreOpen", |q| &q.pre_open, percent),
        Column::new(AfterHours, 10, "AfterHours", |q| &q.after_hours, percent),
    ]
}

/// `%*s`: positive widths right-justify, negative left-justify.
fn justify(text: &str, width: i32) -> String {
    let w = width.unsigned_abs() as usize;
    if width < 0 {
        format!("{text:<w$}")
    } else {
        format!("{text:>w$}")
    }
}

fn is_missing(raw: &str) -> bool {
    matches!(raw.trim(), "" | "N/A" | "-")
}

fn plain(raw: &str, _currency: &str) -> String {
    raw.to_string()
}

fn blank(raw: &str, _currency: &str) -> String {
    if is_missing(raw) { "-".to_string() } else { raw.to_string() }
}

/// Last trade, dropping a leading `N/A - ` marker.
fn last(raw: &str, code: &str) -> String {
    currency(raw.strip_prefix("N/A - ").unwrap_or(raw), code)
}

/// Prefix the currency symbol, keeping the sign in front of it.
fn currency(raw: &str, code: &str) -> String {
    let raw = raw.trim();
    if is_missing(raw) {
        return "-".to_string();
    }
    let symbol = currency_symbol(code);
    let (sign, digits) = match raw.chars().next() {
        Some(c @ ('+' | '-')) => (Some(c), &raw[1..]),
        _ => (None, raw),
    };
    let digits = crate::numeric::CURRENCY_SYMBOLS
        .iter()
        .find_map(|s| digits.strip_prefix(s))
        .unwrap_or(digits);

    match sign {
        Some(sign) => format!("{sign}{symbol}{digits}"),
        None => format!("{symbol}{digits}"),
    }
}

fn blank_currency(raw: &str, code: &str) -> String {
    if raw.trim() == "0.00" {
        "-".to_string()
    } else {
        currency(raw, code)
    }
}

/// Two fractional digits followed by `%`.
fn percent(raw: &str, _currency: &str) -> String {
    let raw = raw.strip_prefix("N/A - ").unwrap_or(raw).trim();
    if is_missing(raw) {
        return "-".to_string();
    }
    let raw = raw.trim_end_matches('%');
    let text = match raw.split_once('.') {
        Some((whole, fraction)) => {
            let fraction: String = fraction.chars().chain("00".chars()).take(2).collect();
            format!("{whole}.{fraction}")
        }
        None => format!("{raw}.00"),
    };
    format!("{text}%")
}

fn timestamp(now: DateTime<Local>) -> String {
    format!("<right><white>{}</></right>", clock(now))
}

/// `3:04:05pm`
pub fn clock(now: DateTime<Local>) -> String {
    now.format("%-I:%M:%S%P").to_string()
}

/// `Dow 38,000.00 (<green>+120.50</>, +0.32%)`
fn index(ix: &MarketIndex) -> String {
    let change = if ix.change.is_empty() {
        String::new()
    } else if ix.change.starts_with('-') {
        format!("<red>{}</>", ix.change)
    } else {
        format!("<green>{}</>", ix.change)
    };

    if ix.latest.is_empty() {
        return format!("{} -", ix.name);
    }
    if ix.percent.is_empty() {
        format!("{} {} ({change})", ix.name, ix.latest)
    } else {
        format!("{} {} ({change}, {})", ix.name, ix.latest, ix.percent)
    }
}

fn row_line(row: &Row) -> String {
    let text = row.cells.concat();
    match row.quote.direction {
        Direction::Advancing => format!("<green>{text}</>"),
        Direction::Declining => format!("<red>{text}</>"),
        Direction::Flat => text,
    }
}

/// Advancing and flat rows first, then declining, each keeping its order.
fn group(rows: Vec<Row>) -> Vec<Row> {
    let (mut up, down): (Vec<Row>, Vec<Row>) = rows
        .into_iter()
        .partition(|r| r.quote.direction != Direction::Declining);
    up.extend(down);
    up
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketData;
    use crate::profile::Settings;
    use crate::profile::testing::{profile, profile_with};
    use crate::provider::testing::quote;
    use chrono::TimeZone;

    fn layout() -> Layout {
        Layout::new().unwrap()
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, 15, 4, 5).unwrap()
    }

    fn snapshot(stocks: Vec<Quote>) -> QuotesSnapshot {
        QuotesSnapshot { stocks, error: None }
    }

    fn data_lines(view: &QuotesView) -> Vec<&str> {
        view.text.lines().skip(view.header_line + 1).collect()
    }

    #[test]
    fn test_currency_formatter_sign_and_missing() {
        assert_eq!(currency("1.23", "USD"), "$1.23");
        assert_eq!(currency("-1.23", "USD"), "-$1.23");
        assert_eq!(currency("+0.50", "EUR"), "+€0.50");
        assert_eq!(currency("N/A", "USD"), "-");
        assert_eq!(currency("$5.00", "USD"), "$5.00");
    }

    #[test]
    fn test_other_formatters() {
        assert_eq!(percent("1.5", ""), "1.50%");
        assert_eq!(percent("-0.1234%", ""), "-0.12%");
        assert_eq!(percent("N/A", ""), "-");
        assert_eq!(percent("3", ""), "3.00%");
        assert_eq!(blank("N/A", ""), "-");
        assert_eq!(blank("12.3M", ""), "12.3M");
        assert_eq!(blank_currency("0.00", "USD"), "-");
        assert_eq!(blank_currency("0.96", "USD"), "$0.96");
        assert_eq!(last("N/A - 12.00", "USD"), "$12.00");
    }

    #[test]
    fn test_currency_formatter_is_idempotent_under_parsing() {
        use crate::numeric::parse_number;
        for raw in ["1.23", "-4.5", "+0.07", "$9.99", "123.456"] {
            assert_eq!(parse_number(&currency(raw, "USD")), parse_number(raw));
        }
    }

    #[test]
    fn test_pad_normalizes_fraction() {
        let l = layout();
        assert_eq!(l.pad("$1.5", 8), "   $1.50");
        assert_eq!(l.pad("$123.4567", 8), " $123.45");
        assert_eq!(l.pad("1.234M", 8), "   1.23M");
        assert_eq!(l.pad("1.23", 6), "  1.23");
        assert_eq!(l.pad("AAPL", -7), "AAPL   ");
        assert_eq!(l.pad("-", 4), "   -");
    }

    #[test]
    fn test_header_marks_sort_and_selection() {
        let l = layout();
        let mut p = profile();
        let header = l.header(&p);
        assert!(header.starts_with("<u>\u{2191}Ticker"));
        assert!(header.ends_with("</u>"));
        assert!(!header.contains("<r>"));

        p.select_column(Some(2));
        let header = l.header(&p);
        assert!(header.contains(&format!("<r>{:>10}</r>", "Change")));
    }

    #[test]
    fn test_quotes_skeleton_and_header_row() {
        let mut l = layout();
        let mut p = profile();
        let view = l.render_quotes(&snapshot(vec![quote("AAPL", "1.00", "1", "1")]), &mut p, now());
        let lines: Vec<&str> = view.text.lines().collect();
        assert_eq!(view.header_line, HEADER_ROW);
        assert!(lines[..HEADER_ROW].iter().all(|l| l.is_empty()));
        assert!(lines[HEADER_ROW].starts_with("<u>"));
        assert_eq!(lines.len(), HEADER_ROW + 2);
        assert!(!view.filter_reset);
    }

    #[test]
    fn test_timestamp_line() {
        let mut l = layout();
        let mut p = profile_with(Settings {
            show_timestamp: true,
            ..Settings::default()
        });
        let view = l.render_quotes(&snapshot(Vec::new()), &mut p, now());
        assert_eq!(view.text.lines().next().unwrap(), "<right><white>3:04:05pm</></right>");
    }

    #[test]
    fn test_rows_colored_by_direction() {
        let mut l = layout();
        let mut p = profile();
        let stocks = vec![
            quote("AAPL", "100.00", "+1.00", "+1.00"),
            quote("IBM", "100.00", "-1.00", "-1.00"),
            quote("KO", "100.00", "0.00", "0.00"),
        ];
        let view = l.render_quotes(&snapshot(stocks), &mut p, now());
        let rows = data_lines(&view);
        assert!(rows[0].starts_with("<green>AAPL"));
        assert!(rows[1].starts_with("<red>IBM"));
        assert!(rows[2].starts_with("KO"));
    }

    #[test]
    fn test_grouping_puts_advancers_first() {
        let mut l = layout();
        let mut p = profile_with(Settings {
            grouped: true,
            ..Settings::default()
        });
        let stocks = vec![
            quote("A", "1.00", "-1.00", "-1.00"),
            quote("B", "1.00", "+1.00", "+1.00"),
            quote("C", "1.00", "-2.00", "-2.00"),
            quote("D", "1.00", "+2.00", "+2.00"),
        ];
        let view = l.render_quotes(&snapshot(stocks), &mut p, now());
        let order: Vec<char> = data_lines(&view)
            .iter()
            .map(|line| line.trim_start_matches("<green>").trim_start_matches("<red>"))
            .filter_map(|line| line.chars().next())
            .collect();
        assert_eq!(order, vec!['B', 'D', 'A', 'C']);
    }

    #[test]
    fn test_grouping_skipped_when_sorting_by_change() {
        let mut l = layout();
        let mut p = profile_with(Settings {
            grouped: true,
            sort_column: ColumnId::ChangePct as usize,
            ..Settings::default()
        });
        let stocks = vec![
            quote("A", "1.00", "+1.00", "+1.00"),
            quote("B", "1.00", "-3.00", "-3.00"),
        ];
        let view = l.render_quotes(&snapshot(stocks), &mut p, now());
        assert!(data_lines(&view)[0].starts_with("<red>B"));
    }

    #[test]
    fn test_long_tickers_widen_column() {
        let mut l = layout();
        let mut p = profile();
        let view = l.render_quotes(
            &snapshot(vec![quote("BRK-B.TEST", "1.00", "0", "0")]),
            &mut p,
            now(),
        );
        let row = data_lines(&view)[0];
        assert!(row.starts_with("BRK-B.TEST "));
        assert!(l.header(&p).starts_with(&format!("<u>{:<11}", "\u{2191}Ticker")));
    }

    #[test]
    fn test_filter_applied_before_render() {
        let mut l = layout();
        let mut p = profile();
        p.set_filter("ticker == 'IBM'").unwrap();
        let stocks = vec![quote("AAPL", "1.00", "0", "0"), quote("IBM", "1.00", "0", "0")];
        let view = l.render_quotes(&snapshot(stocks), &mut p, now());
        let rows = data_lines(&view);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("IBM"));
    }

    #[test]
    fn test_failing_filter_reports_reset() {
        let mut l = layout();
        let mut p = profile();
        p.set_filter("bogus > 1").unwrap();
        let stocks = vec![quote("AAPL", "1.00", "0", "0")];
        let view = l.render_quotes(&snapshot(stocks.clone()), &mut p, now());
        assert!(view.filter_reset);
        assert!(data_lines(&view).is_empty());

        let view = l.render_quotes(&snapshot(stocks), &mut p, now());
        assert!(!view.filter_reset);
        assert_eq!(data_lines(&view).len(), 1);
    }

    #[test]
    fn test_quotes_error_is_verbatim() {
        let mut l = layout();
        let mut p = profile();
        let snapshot = QuotesSnapshot {
            stocks: Vec::new(),
            error: Some("Error fetching stock quotes: boom".into()),
        };
        let view = l.render_quotes(&snapshot, &mut p, now());
        assert_eq!(
            view.text.lines().nth(HEADER_ROW),
            Some("Error fetching stock quotes: boom")
        );
    }

    #[test]
    fn test_market_summary() {
        let l = layout();
        let mut data = MarketData::default();
        data.closed = true;
        data.dow.latest = "38,000.00".into();
        data.dow.change = "+120.50".into();
        data.dow.percent = "+0.32%".into();
        data.gold.latest = "2,050.10".into();
        data.gold.change = "-3.00".into();
        data.gold.percent = "-0.15%".into();

        let text = l.render_market(&MarketSnapshot { data, error: None });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Dow 38,000.00 (<green>+120.50</>, +0.32%)"));
        assert!(lines[1].ends_with("<right>U.S. markets closed</right>"));
        assert!(lines[2].ends_with("Gold 2,050.10 (<red>-3.00</>, -0.15%)"));
    }

    #[test]
    fn test_market_error_is_verbatim() {
        let l = layout();
        let snapshot = MarketSnapshot {
            data: MarketData::default(),
            error: Some("Error fetching market data: timeout".into()),
        };
        assert_eq!(l.render_market(&snapshot), "Error fetching market data: timeout");
    }
}
