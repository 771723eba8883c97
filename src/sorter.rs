//! Ordering of formatted quote rows by the active sort column.

use crate::layout::{ColumnId, Row};
use crate::numeric::parse_number;
use std::cmp::Ordering;

/// How a column's cells compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    /// Plain string comparison of the formatted cell.
    Lexical(ColumnId),
    /// Compare the value parsed back out of the formatted cell.
    Numeric(ColumnId),
}

impl SortKey {
    fn for_column(column: ColumnId) -> Self {
        match column {
            ColumnId::Ticker
            | ColumnId::LastTrade
            | ColumnId::Open
            | ColumnId::Low
            | ColumnId::High
            | ColumnId::Low52
            | ColumnId::High52 => SortKey::Lexical(column),
            // Both change columns order by percent.
            ColumnId::Change | ColumnId::ChangePct => SortKey::Numeric(ColumnId::ChangePct),
            _ => SortKey::Numeric(column),
        }
    }

    /// Total order: equal cells fall back to the ticker, which is unique.
    fn compare(self, a: &Row, b: &Row) -> Ordering {
        let by_cell = match self {
            SortKey::Lexical(column) => a.cell(column).cmp(b.cell(column)),
            SortKey::Numeric(column) => parse_number(a.cell(column))
                .partial_cmp(&parse_number(b.cell(column)))
                .unwrap_or(Ordering::Equal),
        };
        by_cell.then_with(|| a.quote.ticker.cmp(&b.quote.ticker))
    }
}

/// Sort key per column, built once.
pub struct Sorter {
    keys: Vec<SortKey>,
}

impl Sorter {
    pub fn new() -> Self {
        let keys = ColumnId::ALL.iter().map(|&c| SortKey::for_column(c)).collect();
        Self { keys }
    }

    /// Sort by `column`. Out-of-range columns leave the rows alone.
    pub fn sort(&self, rows: &mut [Row], column: usize, ascending: bool) {
        let Some(&key) = self.keys.get(column) else {
            return;
        };
        if ascending {
            rows.sort_by(|a, b| key.compare(a, b));
        } else {
            rows.sort_by(|a, b| key.compare(b, a));
        }
    }
}

impl Default for Sorter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quote;
    use proptest::prelude::*;

    fn row(ticker: &str, last: &str, pct: &str, volume: &str) -> Row {
        let mut cells = vec![String::new(); ColumnId::ALL.len()];
        cells[ColumnId::Ticker as usize] = format!("{ticker:<7}");
        cells[ColumnId::LastTrade as usize] = format!("{last:>10}");
        cells[ColumnId::ChangePct as usize] = format!("{pct:>10}");
        cells[ColumnId::Volume as usize] = format!("{volume:>11}");
        Row {
            quote: Quote {
                ticker: ticker.to_string(),
                ..Quote::default()
            },
            cells,
        }
    }

    fn tickers(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.quote.ticker.as_str()).collect()
    }

    #[test]
    fn test_sort_by_ticker() {
        let sorter = Sorter::new();
        let mut rows = vec![
            row("MSFT", "$1", "0%", "1"),
            row("AAPL", "$1", "0%", "1"),
            row("IBM", "$1", "0%", "1"),
        ];
        sorter.sort(&mut rows, ColumnId::Ticker as usize, true);
        assert_eq!(tickers(&rows), vec!["AAPL", "IBM", "MSFT"]);

        sorter.sort(&mut rows, ColumnId::Ticker as usize, false);
        assert_eq!(tickers(&rows), vec!["MSFT", "IBM", "AAPL"]);
    }

    #[test]
    fn test_change_columns_sort_by_percent() {
        let sorter = Sorter::new();
        let mut rows = vec![
            row("A", "$1", "+1.50%", "1"),
            row("B", "$1", "-0.20%", "1"),
            row("C", "$1", "+10.00%", "1"),
        ];
        sorter.sort(&mut rows, ColumnId::ChangePct as usize, false);
        assert_eq!(tickers(&rows), vec!["C", "A", "B"]);

        sorter.sort(&mut rows, ColumnId::Change as usize, true);
        assert_eq!(tickers(&rows), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_volume_sorts_by_magnitude() {
        let sorter = Sorter::new();
        let mut rows = vec![
            row("A", "$1", "0%", "900.00K"),
            row("B", "$1", "0%", "1.20B"),
            row("C", "$1", "0%", "15.00M"),
        ];
        sorter.sort(&mut rows, ColumnId::Volume as usize, true);
        assert_eq!(tickers(&rows), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_equal_keys_order_by_ticker() {
        let sorter = Sorter::new();
        let mut rows = vec![
            row("Z", "$1", "1.00%", "1"),
            row("Y", "$1", "1.00%", "1"),
            row("X", "$1", "1.00%", "1"),
        ];
        sorter.sort(&mut rows, ColumnId::ChangePct as usize, true);
        assert_eq!(tickers(&rows), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_descending_is_ascending_reversed_with_ties() {
        let sorter = Sorter::new();
        let mut asc = vec![
            row("A", "$1", "1.00%", "1"),
            row("B", "$1", "1.00%", "1"),
            row("C", "$1", "2.00%", "1"),
        ];
        let mut desc = asc.clone();
        sorter.sort(&mut asc, ColumnId::ChangePct as usize, true);
        asc.reverse();
        sorter.sort(&mut desc, ColumnId::ChangePct as usize, false);
        assert_eq!(tickers(&asc), vec!["C", "B", "A"]);
        assert_eq!(tickers(&desc), tickers(&asc));
    }

    #[test]
    fn test_out_of_range_column_is_ignored() {
        let sorter = Sorter::new();
        let mut rows = vec![row("B", "$1", "0%", "1"), row("A", "$1", "0%", "1")];
        sorter.sort(&mut rows, 99, true);
        assert_eq!(tickers(&rows), vec!["B", "A"]);
    }

    proptest! {
        #[test]
        fn prop_descending_matches_ascending_reversed(
            pcts in proptest::collection::vec(-3i32..3, 1..12),
            column in 0..ColumnId::ALL.len(),
        ) {
            let sorter = Sorter::new();
            let rows: Vec<Row> = pcts
                .iter()
                .enumerate()
                .map(|(i, pct)| {
                    let volume = format!("{}K", (i as i32 * 7) % 4);
                    row(&format!("T{i:02}"), &format!("${}", pct.abs()), &format!("{pct}.00%"), &volume)
                })
                .collect();

            let mut asc = rows.clone();
            sorter.sort(&mut asc, column, true);
            asc.reverse();
            let mut desc = rows.clone();
            sorter.sort(&mut desc, column, false);
            prop_assert_eq!(tickers(&asc), tickers(&desc));

            let mut again = desc.clone();
            sorter.sort(&mut again, column, false);
            prop_assert_eq!(tickers(&again), tickers(&desc));
        }
    }
}
