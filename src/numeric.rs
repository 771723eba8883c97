//! Parsing decorated numeric strings back into numbers.
//!
//! Grid cells carry currency symbols, percent signs, and compact magnitude
//! suffixes. Sorting and filtering both need the plain value, and both go
//! through [`parse_number`] so they always agree.

use num_format::{Locale, ToFormattedString};

/// Currency symbols recognized in front of a number.
pub const CURRENCY_SYMBOLS: [&str; 6] = ["$", "€", "£", "¥", "₹", "₩"];

/// Display symbol for an ISO 4217 currency code; unknown codes get `$`.
pub fn currency_symbol(code: &str) -> &'static str {
    match code.trim().to_ascii_uppercase().as_str() {
        "EUR" => "€",
        "GBP" | "GBX" | "GBp" => "£",
        "JPY" | "CNY" => "¥",
        "INR" => "₹",
        "KRW" => "₩",
        _ => "$",
    }
}

/// Multiplier for a trailing `K`/`M`/`B`/`T` suffix.
fn magnitude(suffix: char) -> Option<f64> {
    match suffix {
        'K' => Some(1e3),
        'M' => Some(1e6),
        'B' => Some(1e9),
        'T' => Some(1e12),
        _ => None,
    }
}

/// Parse `"-$1.23"`, `"+1.50%"`, `"$3.6B"`, `"1.5K"`, or `"42"`.
///
/// Anything that doesn't parse is zero.
pub fn parse_number(text: &str) -> f64 {
    let mut rest = text.trim();
    let mut negative = false;

    if let Some(stripped) = rest.strip_prefix('-') {
        negative = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    if let Some(stripped) = CURRENCY_SYMBOLS
        .iter()
        .find_map(|symbol| rest.strip_prefix(symbol))
    {
        rest = stripped;
    }

    let rest = rest.trim_end_matches('%').trim();
    let (digits, multiplier) = match rest.chars().last().and_then(magnitude) {
        Some(multiplier) => (&rest[..rest.len() - 1], multiplier),
        None => (rest, 1.0),
    };

    let value = match digits.trim().replace(',', "").parse::<f64>() {
        Ok(value) if value.is_finite() => value * multiplier,
        _ => 0.0,
    };

    if negative { -value } else { value }
}

/// Compact form used for volumes and market caps: `12.35M`, `2.85T`.
pub fn format_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", value / 1e3)
    } else {
        (value.round() as i64).to_formatted_string(&Locale::en)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_magnitude_suffixes() {
        assert_eq!(parse_number("1.5K"), 1_500.0);
        assert_eq!(parse_number("2M"), 2_000_000.0);
        assert_eq!(parse_number("3.2B"), 3_200_000_000.0);
        assert_eq!(parse_number("1T"), 1_000_000_000_000.0);
        assert_eq!(parse_number("42.5"), 42.5);
    }

    #[test]
    fn test_currency_and_percent() {
        assert_eq!(parse_number("$3.6B"), 3.6e9);
        assert_eq!(parse_number("0.03%"), 0.03);
        assert_eq!(parse_number("+1.50%"), 1.5);
        assert_eq!(parse_number("-0.20%"), -0.2);
        assert_eq!(parse_number("-$1.23"), -1.23);
        assert_eq!(parse_number("+€4.00"), 4.0);
        assert_eq!(parse_number("  £12.5  "), 12.5);
    }

    #[test]
    fn test_unparseable_is_zero() {
        assert_eq!(parse_number("N/A"), 0.0);
        assert_eq!(parse_number("-"), 0.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("NaN"), 0.0);
        assert_eq!(parse_number("abcM"), 0.0);
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(parse_number("1,234"), 1234.0);
    }

    #[test]
    fn test_currency_symbol_lookup() {
        assert_eq!(currency_symbol("USD"), "$");
        assert_eq!(currency_symbol("eur"), "€");
        assert_eq!(currency_symbol("JPY"), "¥");
        assert_eq!(currency_symbol(""), "$");
        assert_eq!(currency_symbol("XYZ"), "$");
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_compact(12_345_678.0), "12.35M");
        assert_eq!(format_compact(2_850_000_000_000.0), "2.85T");
        assert_eq!(format_compact(1_500.0), "1.50K");
        assert_eq!(format_compact(999.0), "999");
    }

    proptest! {
        #[test]
        fn prop_compact_round_trips_within_rounding(value in 1_000.0f64..1e14) {
            let parsed = parse_number(&format_compact(value));
            prop_assert!((parsed - value).abs() / value < 0.01);
        }
    }
}
