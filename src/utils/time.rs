//! Tick parsing and formatting utilities
//!
//! Time values never pass through floating point here. Decimal-second
//! strings are split at the dot and scaled with integer arithmetic.

use crate::domain::model::{Tick, TICKS_PER_MILLISECOND, TICKS_PER_SECOND};
use crate::error::{ComposerError, ComposerResult};

const FRACTION_DIGITS: usize = 6;

/// Parse decimal seconds (`"1.023"`, `"-0.5"`, `"12"`) into ticks.
///
/// Digits past microsecond precision are truncated. Returns `None` for
/// anything that is not a plain decimal number.
pub fn parse_decimal_seconds(input: &str) -> Option<Tick> {
    let input = input.trim();
    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let seconds: Tick = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let kept = &fraction[..fraction.len().min(FRACTION_DIGITS)];
    let mut micros: Tick = if kept.is_empty() { 0 } else { kept.parse().ok()? };
    for _ in kept.len()..FRACTION_DIGITS {
        micros *= 10;
    }

    let ticks = seconds.checked_mul(TICKS_PER_SECOND)?.checked_add(micros)?;
    Some(if negative { -ticks } else { ticks })
}

/// Parse a user-supplied tick value. Accepts raw ticks (`"1500000"`) or
/// seconds with an `s` suffix (`"1.5s"`).
pub fn parse_tick_arg(input: &str) -> ComposerResult<Tick> {
    let trimmed = input.trim();
    let parsed = match trimmed.strip_suffix('s') {
        Some(seconds) => parse_decimal_seconds(seconds),
        None => trimmed.parse::<Tick>().ok(),
    };
    parsed.ok_or_else(|| ComposerError::InvalidTimeFormat {
        value: input.to_string(),
    })
}

/// Parse a comma separated duration list, e.g. `"1000,950,1020"`
pub fn parse_tick_list(input: &str) -> ComposerResult<Vec<Tick>> {
    input
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_tick_arg)
        .collect()
}

/// Format ticks as `MM:SS.mmm`, or `HH:MM:SS.mmm` past one hour
pub fn format_ticks(ticks: Tick) -> String {
    let sign = if ticks < 0 { "-" } else { "" };
    let ticks = ticks.unsigned_abs();
    let millis_total = ticks / TICKS_PER_MILLISECOND as u64;
    let millis = millis_total % 1000;
    let total_seconds = millis_total / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}{:02}:{:02}:{:02}.{:03}", sign, hours, minutes, seconds, millis)
    } else {
        format!("{}{:02}:{:02}.{:03}", sign, minutes, seconds, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_seconds() {
        assert_eq!(parse_decimal_seconds("1.023000"), Some(1_023_000));
        assert_eq!(parse_decimal_seconds("12"), Some(12_000_000));
        assert_eq!(parse_decimal_seconds("0.5"), Some(500_000));
        assert_eq!(parse_decimal_seconds(".25"), Some(250_000));
        assert_eq!(parse_decimal_seconds("-0.5"), Some(-500_000));
        assert_eq!(parse_decimal_seconds(" 3.0 "), Some(3_000_000));
    }

    #[test]
    fn test_parse_truncates_past_microseconds() {
        assert_eq!(parse_decimal_seconds("1.0000019"), Some(1_000_001));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_decimal_seconds(""), None);
        assert_eq!(parse_decimal_seconds("."), None);
        assert_eq!(parse_decimal_seconds("1e3"), None);
        assert_eq!(parse_decimal_seconds("N/A"), None);
        assert_eq!(parse_decimal_seconds("1.2.3"), None);
    }

    #[test]
    fn test_parse_tick_args() {
        assert_eq!(parse_tick_arg("1500").ok(), Some(1500));
        assert_eq!(parse_tick_arg("1.5s").ok(), Some(1_500_000));
        assert!(parse_tick_arg("abc").is_err());
        assert_eq!(
            parse_tick_list("1000, 950,1020").ok(),
            Some(vec![1000, 950, 1020])
        );
    }

    #[test]
    fn test_format_ticks() {
        assert_eq!(format_ticks(0), "00:00.000");
        assert_eq!(format_ticks(2_970_000), "00:02.970");
        assert_eq!(format_ticks(61_500_000), "01:01.500");
        assert_eq!(format_ticks(3_723_004_000), "01:02:03.004");
        assert_eq!(format_ticks(-1_000_000), "-00:01.000");
    }
}
