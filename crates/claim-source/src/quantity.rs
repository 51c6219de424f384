//! Kubernetes resource quantities
//!
//! Parses the quantity strings used in `spec.resources.requests` (`10Mi`,
//! `1.5G`, `500m`, `1e3`) into a whole number of bytes. Fractional values
//! are rounded up to the next byte, matching how the API server reports
//! `Quantity.Value()` for storage.
//!
//! A single parsed quantity is at most `u64::MAX` bytes. Values are held as
//! `u128` so that sums over any number of claims stay exact.

use crate::error::ClaimSourceError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Binary suffixes and their power of 1024
const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

/// Decimal suffixes and their power of 1000
const DECIMAL_SUFFIXES: [(&str, u32); 6] = [
    ("k", 1),
    ("M", 2),
    ("G", 3),
    ("T", 4),
    ("P", 5),
    ("E", 6),
];

/// Largest quantity a single string may denote
const MAX_PARSED_BYTES: u128 = u64::MAX as u128;

/// A non-negative storage quantity in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(u128);

impl Quantity {
    /// The zero quantity
    pub const ZERO: Self = Self(0);

    /// Creates a quantity from a number of bytes.
    #[must_use]
    pub const fn from_bytes(bytes: u128) -> Self {
        Self(bytes)
    }

    /// Returns the quantity in bytes.
    #[must_use]
    pub const fn bytes(self) -> u128 {
        self.0
    }

    /// Returns `true` if the quantity is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Ratio of this quantity to `whole`, as used for utilization reports.
    ///
    /// A zero `whole` yields infinity for a non-zero quantity and zero otherwise.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "ratios are for reporting only")]
    pub fn ratio_of(self, whole: Self) -> f64 {
        if whole.0 == 0 {
            return if self.0 == 0 { 0.0 } else { f64::INFINITY };
        }
        self.0 as f64 / whole.0 as f64
    }
}

enum Suffix {
    None,
    Binary(u32),
    Decimal(u32),
    Milli,
    Exponent(i32),
}

fn invalid(input: &str, reason: &str) -> ClaimSourceError {
    ClaimSourceError::InvalidQuantity(format!("{input:?}: {reason}"))
}

fn parse_suffix(input: &str, suffix: &str) -> Result<Suffix, ClaimSourceError> {
    if suffix.is_empty() {
        return Ok(Suffix::None);
    }
    if suffix == "m" {
        return Ok(Suffix::Milli);
    }
    if let Some((_, power)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok(Suffix::Binary(*power));
    }
    if let Some((_, power)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok(Suffix::Decimal(*power));
    }
    // "E" alone is exa, "E3" / "e3" is an exponent
    if let Some(exponent) = suffix.strip_prefix(['e', 'E']) {
        return exponent
            .parse::<i32>()
            .map(Suffix::Exponent)
            .map_err(|_| invalid(input, "malformed exponent"));
    }
    Err(invalid(input, "unknown suffix"))
}

fn parse_digits(input: &str, digits: &str) -> Result<u128, ClaimSourceError> {
    digits.bytes().try_fold(0u128, |acc, digit| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u128::from(digit - b'0')))
            .ok_or_else(|| invalid(input, "too many digits"))
    })
}

impl FromStr for Quantity {
    type Err = ClaimSourceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.starts_with('-') {
            return Err(invalid(input, "negative quantity"));
        }
        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

        let split = unsigned
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(split);

        let (integer, fraction) = number.split_once('.').unwrap_or((number, ""));
        if fraction.contains('.') {
            return Err(invalid(input, "more than one decimal point"));
        }
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid(input, "missing number"));
        }

        let suffix = parse_suffix(input, suffix)?;
        let overflow = || invalid(input, "out of range");

        let mut numerator = parse_digits(input, &format!("{integer}{fraction}"))?;
        // Net power of ten applied to the digits
        let mut scale = -i64::try_from(fraction.len()).map_err(|_| overflow())?;
        match suffix {
            Suffix::None => {}
            Suffix::Binary(power) => {
                numerator = numerator
                    .checked_mul(1u128 << (10 * power))
                    .ok_or_else(overflow)?;
            }
            Suffix::Decimal(power) => scale += i64::from(3 * power),
            Suffix::Milli => scale -= 3,
            Suffix::Exponent(exponent) => scale += i64::from(exponent),
        }

        let bytes = if numerator == 0 {
            0
        } else if scale >= 0 {
            u32::try_from(scale)
                .ok()
                .and_then(|scale| 10u128.checked_pow(scale))
                .and_then(|factor| numerator.checked_mul(factor))
                .ok_or_else(overflow)?
        } else {
            // A denominator beyond u128 exceeds any numerator: the value is
            // below one byte and rounds up
            u32::try_from(scale.unsigned_abs())
                .ok()
                .and_then(|scale| 10u128.checked_pow(scale))
                .map_or(1, |denominator| numerator.div_ceil(denominator))
        };

        if bytes > MAX_PARSED_BYTES {
            return Err(overflow());
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Quantity {
    /// Canonical form: largest exact binary suffix, then decimal, then bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes == 0 {
            return f.write_str("0");
        }
        for (suffix, power) in BINARY_SUFFIXES.iter().rev() {
            let unit = 1u128 << (10 * power);
            if bytes % unit == 0 {
                return write!(f, "{}{suffix}", bytes / unit);
            }
        }
        for (suffix, power) in DECIMAL_SUFFIXES.iter().rev() {
            let unit = 1000u128.pow(*power);
            if bytes % unit == 0 {
                return write!(f, "{}{suffix}", bytes / unit);
            }
        }
        write!(f, "{bytes}")
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(input: &str) -> u128 {
        input
            .parse::<Quantity>()
            .unwrap_or_else(|e| panic!("{input} should parse: {e}"))
            .bytes()
    }

    #[test]
    fn test_parse_plain_and_suffixed() {
        assert_eq!(bytes("0"), 0);
        assert_eq!(bytes("100"), 100);
        assert_eq!(bytes("+5Ki"), 5 * 1024);
        assert_eq!(bytes("1k"), 1000);
        assert_eq!(bytes("10Mi"), 10 * 1024 * 1024);
        assert_eq!(bytes("200Gi"), 200 * 1024 * 1024 * 1024);
        assert_eq!(bytes("3T"), 3_000_000_000_000);
        assert_eq!(bytes("1E"), 1_000_000_000_000_000_000);
        assert_eq!(bytes(" 2Mi "), 2 * 1024 * 1024);
    }

    #[test]
    fn test_parse_fractions_round_up() {
        assert_eq!(bytes("1.5Gi"), 1_610_612_736);
        assert_eq!(bytes("1.5G"), 1_500_000_000);
        assert_eq!(bytes("500m"), 1);
        assert_eq!(bytes("1500m"), 2);
        assert_eq!(bytes("0.1"), 1);
        assert_eq!(bytes(".5Ki"), 512);
    }

    #[test]
    fn test_parse_exponents() {
        assert_eq!(bytes("1e3"), 1000);
        assert_eq!(bytes("2E6"), 2_000_000);
        assert_eq!(bytes("2.5e-1"), 1);
        assert_eq!(bytes("1.5e3"), 1500);
        assert_eq!(bytes("25e-1"), 3);
    }

    #[test]
    fn test_parse_tiny_values_round_up_to_one_byte() {
        assert_eq!(bytes("1e-39"), 1);
        assert_eq!(bytes("1e-400"), 1);
        assert_eq!(bytes(&format!("0.{}1", "0".repeat(40))), 1);
        assert_eq!(bytes("0e-50"), 0);
        assert_eq!(bytes("0.000"), 0);
    }

    #[test]
    fn test_parse_largest_single_quantity() {
        assert_eq!(bytes("10Ei"), 10 << 60);
        assert_eq!(bytes("15Ei"), 15 << 60);
        assert_eq!(bytes("18446744073709551615"), u128::from(u64::MAX));
        assert!("18446744073709551616".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "", "Mi", "10Xi", "-1Gi", "1.2.3", "1e", "1ex", "16Ei", "1Mi5", "1e39", "1e99999",
        ] {
            assert!(
                input.parse::<Quantity>().is_err(),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_canonical_form() {
        assert_eq!(Quantity::ZERO.to_string(), "0");
        assert_eq!(Quantity::from_bytes(10 * 1024 * 1024).to_string(), "10Mi");
        assert_eq!(Quantity::from_bytes(1000).to_string(), "1k");
        assert_eq!(Quantity::from_bytes(1_500_000_000).to_string(), "1500M");
        assert_eq!(Quantity::from_bytes(1536).to_string(), "1536");
        assert_eq!(Quantity::from_bytes(110).to_string(), "110");
    }

    #[test]
    fn test_ratio_of() {
        let ceiling = Quantity::from_bytes(100);
        assert!((Quantity::from_bytes(90).ratio_of(ceiling) - 0.9).abs() < f64::EPSILON);
        assert!(Quantity::from_bytes(1).ratio_of(Quantity::ZERO).is_infinite());
        assert!(Quantity::ZERO.ratio_of(Quantity::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serde_uses_quantity_strings() {
        let json = serde_json::to_string(&Quantity::from_bytes(2048)).unwrap_or_default();
        assert_eq!(json, "\"2Ki\"");
        let parsed: Quantity = serde_json::from_str("\"1Gi\"").unwrap_or_default();
        assert_eq!(parsed.bytes(), 1 << 30);
    }
}
