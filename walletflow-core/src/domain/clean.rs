//! Field cleaning and casting rules for staged text
//!
//! Every rule follows the same convention: surrounding whitespace is trimmed,
//! an empty value becomes `None`, and a non-empty value that cannot be cast
//! is an [`Error::Cast`]. Nothing is silently coerced.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use super::result::{Error, Result};

/// Scale of every stored amount
pub const AMOUNT_SCALE: u32 = 2;

/// Largest magnitude the store's `DECIMAL(18, 2)` amount column holds
pub const AMOUNT_MAX: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 2);

/// Offset-aware layouts accepted in addition to RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%#z",
];

/// Layouts without an offset; these are read in the store's session timezone (UTC)
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Trim a text field; empty becomes `None`
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Cast an age field to an integer
pub fn parse_age(raw: &str) -> Result<Option<i32>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i32>()
        .map(Some)
        .map_err(|e| Error::cast("age", raw, e))
}

/// Cast a timestamp field to an absolute instant
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<Option<DateTime<Utc>>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Some(naive.and_utc()));
        }
    }

    Err(Error::cast(field, raw, "not a recognised timestamp"))
}

/// Strip everything except ASCII digits, `.` and `-`.
///
/// The stripped text is not validated for structure: `"12-34.56.78"` stays
/// `"12-34.56.78"` and is rejected later by the decimal cast.
pub fn strip_amount(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

/// Cast an amount field to a 2-decimal fixed-point value
pub fn parse_amount(raw: &str) -> Result<Option<Decimal>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let stripped = strip_amount(raw);
    let value = Decimal::from_str(&stripped).map_err(|e| Error::cast("amount", raw, e))?;

    let mut rounded =
        value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded.abs() > AMOUNT_MAX {
        return Err(Error::cast(
            "amount",
            raw,
            format!("exceeds the storable range of ±{}", AMOUNT_MAX),
        ));
    }
    // rescale silently keeps a smaller scale when the mantissa has no room
    rounded.rescale(AMOUNT_SCALE);
    if rounded.scale() != AMOUNT_SCALE {
        return Err(Error::cast("amount", raw, "cannot be held at 2 decimal places"));
    }
    Ok(Some(rounded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Karnataka "), Some("Karnataka".to_string()));
        assert_eq!(clean_text(""), None);
        assert_eq!(clean_text("   "), None);
    }

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("34").unwrap(), Some(34));
        assert_eq!(parse_age(" 25 ").unwrap(), Some(25));
        assert_eq!(parse_age("").unwrap(), None);
    }

    #[test]
    fn test_parse_age_rejects_non_integer() {
        assert!(parse_age("twenty").unwrap_err().is_cast());
        assert!(parse_age("34.5").unwrap_err().is_cast());
    }

    #[test]
    fn test_amount_negative_is_kept() {
        assert_eq!(parse_amount("-50.5").unwrap().unwrap().to_string(), "-50.50");
    }

    #[test]
    fn test_amount_thousands_separator() {
        assert_eq!(parse_amount("1,234.56").unwrap().unwrap().to_string(), "1234.56");
    }

    #[test]
    fn test_amount_currency_noise() {
        assert_eq!(parse_amount("$1,234.56 INR").unwrap().unwrap().to_string(), "1234.56");
        assert_eq!(parse_amount("₹ 250").unwrap().unwrap().to_string(), "250.00");
    }

    #[test]
    fn test_amount_rounds_half_away_from_zero() {
        assert_eq!(parse_amount("10.005").unwrap().unwrap().to_string(), "10.01");
        assert_eq!(parse_amount("-10.005").unwrap().unwrap().to_string(), "-10.01");
    }

    #[test]
    fn test_amount_empty_is_null() {
        assert_eq!(parse_amount("").unwrap(), None);
        assert_eq!(parse_amount("  ").unwrap(), None);
    }

    #[test]
    fn test_amount_malformed_fails_cast() {
        assert_eq!(strip_amount("12-34.56.78"), "12-34.56.78");
        assert!(parse_amount("12-34.56.78").unwrap_err().is_cast());
        assert!(parse_amount("1.2.3").unwrap_err().is_cast());
        // Nothing numeric survives the strip
        assert!(parse_amount("INR").unwrap_err().is_cast());
    }

    #[test]
    fn test_amount_range_matches_store_column() {
        assert_eq!(AMOUNT_MAX.to_string(), "9999999999999999.99");
        assert_eq!(
            parse_amount("9999999999999999.99").unwrap(),
            Some(AMOUNT_MAX)
        );
        assert_eq!(
            parse_amount("-9,999,999,999,999,999.99").unwrap(),
            Some(-AMOUNT_MAX)
        );
    }

    #[test]
    fn test_amount_out_of_range_fails_cast() {
        assert!(parse_amount("12345678901234567890.12").unwrap_err().is_cast());
        assert!(parse_amount("10000000000000000").unwrap_err().is_cast());
        // Rounding up past the limit is also out of range
        assert!(parse_amount("9999999999999999.995").unwrap_err().is_cast());

        // rust_decimal's own maximum would otherwise come back with scale 0
        let err = parse_amount("79228162514264337593543950335").unwrap_err();
        assert!(err.is_cast());
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_timestamp_with_offset_is_converted_to_utc() {
        let ts = parse_timestamp("sent_time", "2024-03-05T10:30:00+05:30")
            .unwrap()
            .unwrap();
        assert_eq!(ts.hour(), 5);
        assert_eq!(ts.minute(), 0);
    }

    #[test]
    fn test_timestamp_space_separated_offset() {
        let ts = parse_timestamp("sent_time", "2024-03-05 23:15:00+00")
            .unwrap()
            .unwrap();
        assert_eq!(ts.day(), 5);
        assert_eq!(ts.hour(), 23);
    }

    #[test]
    fn test_timestamp_naive_is_utc() {
        let ts = parse_timestamp("sent_time", "2024-03-05 08:00:00")
            .unwrap()
            .unwrap();
        assert_eq!(ts.hour(), 8);
        assert_eq!(ts.month(), 3);
    }

    #[test]
    fn test_timestamp_empty_and_invalid() {
        assert_eq!(parse_timestamp("sent_time", "").unwrap(), None);
        let err = parse_timestamp("received_time", "yesterday").unwrap_err();
        assert!(err.to_string().contains("received_time"));
    }
}
