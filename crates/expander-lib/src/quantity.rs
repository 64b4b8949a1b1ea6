//! Kubernetes resource quantities
//!
//! Parses the quantity grammar used by `resources.requests.storage`
//! (`10Gi`, `500M`, `1.5Gi`, `1e9`) into a whole number of bytes and renders
//! it back in canonical form. Comparison is semantic: `1Gi == 1073741824`.

use crate::error::QuantityError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ei", 60),
    ("Pi", 50),
    ("Ti", 40),
    ("Gi", 30),
    ("Mi", 20),
    ("Ki", 10),
];

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
];

/// Notation a quantity is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityFormat {
    /// Powers of two: Ki, Mi, Gi, ...
    BinarySI,
    /// Powers of ten: k, M, G, ...
    DecimalSI,
    /// Scientific notation: 1e9
    DecimalExponent,
}

/// A storage quantity expressed in whole bytes
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    value: i64,
    format: QuantityFormat,
}

impl Quantity {
    pub fn new(value: i64, format: QuantityFormat) -> Self {
        Self { value, format }
    }

    /// Quantity rendered with binary suffixes
    pub fn binary(value: i64) -> Self {
        Self::new(value, QuantityFormat::BinarySI)
    }

    /// Largest representable quantity, used as the unbounded ceiling
    pub fn max() -> Self {
        Self::new(i64::MAX, QuantityFormat::DecimalSI)
    }

    /// Value in bytes
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let invalid = || QuantityError::InvalidNumber {
            input: input.to_string(),
        };

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let (multiplier, format) = parse_suffix(input, suffix)?;

        let fraction = fraction.trim_end_matches('0');
        let digits = format!("{whole}{fraction}");
        let significant = digits.trim_start_matches('0');
        if significant.len() > MAX_SIGNIFICANT_DIGITS {
            return Err(invalid());
        }
        let mantissa: i128 = if significant.is_empty() {
            0
        } else {
            significant.parse().map_err(|_| invalid())?
        };
        let mantissa = if negative { -mantissa } else { mantissa };

        let fraction_digits = i32::try_from(fraction.len()).map_err(|_| invalid())?;
        let (shift, exponent) = match multiplier {
            Multiplier::Binary(shift) => (shift, -fraction_digits),
            Multiplier::Decimal(e) => (0, e.checked_sub(fraction_digits).ok_or_else(invalid)?),
        };

        Ok(Self::new(scale(mantissa, shift, exponent), format))
    }
}

/// Digits an i128 mantissa always holds
const MAX_SIGNIFICANT_DIGITS: usize = 38;

/// Largest magnitude accepted after `e`/`E`
const MAX_EXPONENT: u32 = 100;

enum Multiplier {
    /// Left shift in bits
    Binary(u32),
    /// Power of ten
    Decimal(i32),
}

fn parse_suffix(input: &str, suffix: &str) -> Result<(Multiplier, QuantityFormat), QuantityError> {
    if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((Multiplier::Binary(*shift), QuantityFormat::BinarySI));
    }

    let decimal = match suffix {
        "" => Some(0),
        "n" => Some(-9),
        "u" => Some(-6),
        "m" => Some(-3),
        other => DECIMAL_SUFFIXES
            .iter()
            .find(|(s, _)| *s == other)
            .map(|(_, e)| *e),
    };
    if let Some(e) = decimal {
        return Ok((Multiplier::Decimal(e), QuantityFormat::DecimalSI));
    }

    if let Some(exp) = suffix.strip_prefix('e').or_else(|| suffix.strip_prefix('E')) {
        if let Ok(e) = exp.parse::<i32>() {
            if e.unsigned_abs() > MAX_EXPONENT {
                return Err(QuantityError::InvalidNumber {
                    input: input.to_string(),
                });
            }
            return Ok((Multiplier::Decimal(e), QuantityFormat::DecimalExponent));
        }
    }

    Err(QuantityError::UnknownSuffix {
        input: input.to_string(),
        suffix: suffix.to_string(),
    })
}

/// Computes `mantissa * 2^shift * 10^exponent`, rounded up to a whole byte
/// and saturated to the i64 range.
fn scale(mut mantissa: i128, shift: u32, mut exponent: i32) -> i64 {
    if mantissa == 0 {
        return 0;
    }
    let saturated = if mantissa > 0 { i64::MAX } else { i64::MIN };
    let Some(factor) = 1i128.checked_shl(shift) else {
        return saturated;
    };

    // Sub-byte digits only matter for rounding; drop them (rounding up)
    // until the binary factor fits.
    while mantissa.checked_mul(factor).is_none() && exponent < 0 {
        mantissa = if mantissa > 0 {
            (mantissa + 9) / 10
        } else {
            mantissa / 10
        };
        exponent += 1;
    }

    let mut numerator = match mantissa.checked_mul(factor) {
        Some(n) => n,
        None => return saturated,
    };
    let mut denominator: i128 = 1;

    if exponent >= 0 {
        for _ in 0..exponent {
            numerator = match numerator.checked_mul(10) {
                Some(n) => n,
                None => return saturated,
            };
        }
    } else {
        for _ in 0..exponent.unsigned_abs() {
            denominator = match denominator.checked_mul(10) {
                Some(d) => d,
                // Smaller than any representable fraction: rounds up to one byte.
                None => return if mantissa > 0 { 1 } else { 0 },
            };
        }
    }

    let mut value = numerator / denominator;
    if numerator % denominator != 0 && numerator > 0 {
        value += 1;
    }
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.value;
        if v == 0 {
            return write!(f, "0");
        }

        match self.format {
            QuantityFormat::BinarySI => {
                for (suffix, shift) in BINARY_SUFFIXES {
                    let unit = 1i64 << shift;
                    if v % unit == 0 {
                        return write!(f, "{}{}", v / unit, suffix);
                    }
                }
            }
            QuantityFormat::DecimalSI => {
                for (suffix, exp) in DECIMAL_SUFFIXES {
                    let unit = 10i64.pow(*exp as u32);
                    if v % unit == 0 {
                        return write!(f, "{}{}", v / unit, suffix);
                    }
                }
            }
            QuantityFormat::DecimalExponent => {
                for (_, exp) in DECIMAL_SUFFIXES {
                    let unit = 10i64.pow(*exp as u32);
                    if v % unit == 0 {
                        return write!(f, "{}e{}", v / unit, exp);
                    }
                }
            }
        }
        write!(f, "{}", v)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
