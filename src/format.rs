use rust_decimal::{Decimal, RoundingStrategy};

/// Currency assumed when a statement does not name one.
pub const DEFAULT_CURRENCY: &str = "LKR";

fn round(value: Decimal, dp: u32) -> Decimal {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    // Avoid rendering "-0.0".
    if rounded.is_zero() {
        Decimal::ZERO
    } else {
        rounded
    }
}

/// Round half away from zero and print exactly `dp` decimal places.
pub fn fixed(value: Decimal, dp: u32) -> String {
    pad_fraction_to_dp(&round(value, dp).to_string(), dp)
}

/// Canonical numeric string used in JSON output: no trailing zeros.
pub fn canonical(value: Decimal) -> String {
    value.normalize().to_string()
}

fn group_int_digits(int_part: &str) -> String {
    // Insert commas every 3 digits, preserving any leading zeros.
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        out.push(ch);
        let remaining = len.saturating_sub(i + 1);
        if remaining > 0 && remaining % 3 == 0 {
            out.push(',');
        }
    }
    out
}

fn pad_fraction_to_dp(s: &str, dp: u32) -> String {
    if dp == 0 {
        return s
            .split_once('.')
            .map(|(i, _)| i.to_string())
            .unwrap_or_else(|| s.to_string());
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    let mut out = String::with_capacity(int_part.len() + 1 + dp as usize);
    out.push_str(int_part);
    out.push('.');

    let mut written = 0usize;
    for ch in frac_part.chars().take(dp as usize) {
        out.push(ch);
        written += 1;
    }
    while written < dp as usize {
        out.push('0');
        written += 1;
    }

    out
}

fn group_number_string(s: &str) -> String {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    let grouped = group_int_digits(int_part);
    match frac_part {
        Some(f) if !f.is_empty() => format!("{grouped}.{f}"),
        _ => grouped,
    }
}

/// Format a statement amount for display: `LKR 1,234,567.50`.
///
/// Two fixed decimals, thousands separators, and the currency code as a
/// prefix. A negative value puts the sign before the code.
pub fn format_amount(value: Decimal, currency: Option<&str>) -> String {
    let currency = currency
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY);

    let rounded = round(value, 2);
    let negative = rounded.is_sign_negative();
    let digits = group_number_string(&pad_fraction_to_dp(&rounded.abs().to_string(), 2));

    let sign = if negative { "-" } else { "" };
    format!("{sign}{currency} {digits}")
}

/// Signed percentage with one decimal, e.g. `28.4%`.
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", fixed(value, 1))
}

/// USD cost of an extraction call.
///
/// Four decimals from one cent upwards; smaller costs keep six decimals so
/// they do not collapse to `$0.0000`.
pub fn format_cost(usd: f64) -> String {
    if usd >= 0.01 {
        format!("${usd:.4}")
    } else {
        format!("${usd:.6}")
    }
}

/// Token counts: `950`, `12.3K`.
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1000 {
        format!("{:.1}K", tokens as f64 / 1000.0)
    } else {
        tokens.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn fixed_rounds_half_away_from_zero() {
        assert_eq!(fixed(d("12.25"), 1), "12.3");
        assert_eq!(fixed(d("-12.25"), 1), "-12.3");
        assert_eq!(fixed(d("100"), 1), "100.0");
        assert_eq!(fixed(d("-0.04"), 1), "0.0");
    }

    #[test]
    fn canonical_strips_trailing_zeros() {
        assert_eq!(canonical(d("1200.500")), "1200.5");
        assert_eq!(canonical(Decimal::ZERO), "0");
    }

    #[test]
    fn format_amount_groups_and_prefixes_currency() {
        assert_eq!(format_amount(d("1234567.5"), Some("USD")), "USD 1,234,567.50");
        assert_eq!(format_amount(d("999"), None), "LKR 999.00");
        assert_eq!(format_amount(d("12.345"), Some("  ")), "LKR 12.35");
    }

    #[test]
    fn format_amount_negative_sign_precedes_currency() {
        assert_eq!(format_amount(d("-1234.5"), Some("LKR")), "-LKR 1,234.50");
    }

    #[test]
    fn format_cost_switches_precision_below_a_cent() {
        assert_eq!(format_cost(0.081), "$0.0810");
        assert_eq!(format_cost(0.0045), "$0.004500");
    }

    #[test]
    fn format_tokens_abbreviates_thousands() {
        assert_eq!(format_tokens(950), "950");
        assert_eq!(format_tokens(15_000), "15.0K");
        assert_eq!(format_tokens(12_345), "12.3K");
    }
}
