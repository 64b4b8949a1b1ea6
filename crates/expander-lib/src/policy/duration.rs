//! Duration strings in the `1h30m`, `45s`, `250ms` notation used by the
//! polling-frequency annotation.

use crate::error::DurationError;
use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a sequence of decimal numbers, each with an optional fraction and a
/// unit suffix (`ns`, `us`, `ms`, `s`, `m`, `h`).
///
/// Zero and negative durations are rejected: they make no sense as a
/// requeue delay.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Invalid {
        input: input.to_string(),
    };

    let mut s = input.trim();
    let negative = match s.as_bytes().first() {
        Some(b'-') => {
            s = &s[1..];
            true
        }
        Some(b'+') => {
            s = &s[1..];
            false
        }
        Some(_) => false,
        None => return Err(invalid()),
    };

    if s == "0" {
        return Err(DurationError::NotPositive {
            input: input.to_string(),
        });
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (int_part, rest) = s.split_at(int_len);
        s = rest;

        let mut frac_part = "";
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            frac_part = &rest[..frac_len];
            s = &rest[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = s
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(s.len());
        let (unit, rest) = s.split_at(unit_len);
        s = rest;
        if unit.is_empty() {
            return Err(DurationError::MissingUnit {
                input: input.to_string(),
            });
        }
        let nanos = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            input: input.to_string(),
            unit: unit.to_string(),
        })?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut value = whole.checked_mul(nanos).ok_or_else(invalid)?;

        if !frac_part.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let frac_part = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = frac_part.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(frac_part.len() as u32);
            value = value
                .checked_add(frac * nanos / scale)
                .ok_or_else(invalid)?;
        }

        total = total.checked_add(value).ok_or_else(invalid)?;
    }

    if negative || total == 0 {
        return Err(DurationError::NotPositive {
            input: input.to_string(),
        });
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h15m").unwrap(), Duration::from_secs(4500));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("+45s").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(matches!(parse_duration(""), Err(DurationError::Invalid { .. })));
        assert!(matches!(parse_duration("abc"), Err(DurationError::Invalid { .. })));
        assert!(matches!(parse_duration("30"), Err(DurationError::MissingUnit { .. })));
        assert!(matches!(
            parse_duration("3d"),
            Err(DurationError::UnknownUnit { .. })
        ));
        assert!(matches!(parse_duration("."), Err(DurationError::Invalid { .. })));
    }

    #[test]
    fn test_parse_rejects_non_positive() {
        assert!(matches!(parse_duration("0"), Err(DurationError::NotPositive { .. })));
        assert!(matches!(parse_duration("0s"), Err(DurationError::NotPositive { .. })));
        assert!(matches!(parse_duration("-5m"), Err(DurationError::NotPositive { .. })));
    }
}
