//! Resource quantities such as `2`, `500m`, `4Gi`, or `1e3`.
//!
//! Values are held exactly as thousandths of a unit so CPU millicores and
//! byte counts share one representation.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::QuantityError;

static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)([0-9]+(?:\.[0-9]*)?|\.[0-9]+)([a-zA-Z][0-9a-zA-Z+-]*)?$")
        .expect("quantity pattern compiles")
});

static EXPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[eE]([+-]?[0-9]+)$").expect("exponent pattern compiles"));

/// Longest mantissa accepted, in digits.
const MAX_DIGITS: usize = 30;

/// Largest decimal exponent accepted in either direction.
const MAX_EXPONENT: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    Binary(u32),
    Decimal(i32),
}

/// A parsed resource quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    raw: String,
    millis: i128,
}

impl Quantity {
    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        let caps = QUANTITY_RE
            .captures(s)
            .ok_or_else(|| QuantityError::Format(s.to_string()))?;

        let negative = &caps[1] == "-";
        let number = &caps[2];
        let suffix = caps.get(3).map_or("", |m| m.as_str());
        let scale = parse_suffix(suffix).ok_or_else(|| QuantityError::Format(s.to_string()))?;

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        let digits = format!("{int_part}{frac_part}");
        if digits.len() > MAX_DIGITS {
            return Err(QuantityError::OutOfRange(s.to_string()));
        }
        let out_of_range = || QuantityError::OutOfRange(s.to_string());
        let mantissa: i128 = digits.parse().map_err(|_| QuantityError::Format(s.to_string()))?;

        let mut numerator = mantissa.checked_mul(1000).ok_or_else(out_of_range)?;
        let mut denominator = pow10(frac_part.len() as u32).ok_or_else(out_of_range)?;
        match scale {
            Scale::Binary(shift) => {
                numerator = numerator.checked_mul(1i128 << shift).ok_or_else(out_of_range)?;
            }
            Scale::Decimal(exp) if exp >= 0 => {
                let factor = pow10(exp as u32).ok_or_else(out_of_range)?;
                numerator = numerator.checked_mul(factor).ok_or_else(out_of_range)?;
            }
            Scale::Decimal(exp) => {
                let factor = pow10(exp.unsigned_abs()).ok_or_else(out_of_range)?;
                denominator = denominator.checked_mul(factor).ok_or_else(out_of_range)?;
            }
        }

        // Round away from zero so sub-milli precision never reads as less.
        let millis = (numerator + denominator - 1) / denominator;
        Ok(Self {
            raw: s.to_string(),
            millis: if negative { -millis } else { millis },
        })
    }

    /// Value in thousandths of a unit (`500m` → 500, `2` → 2000).
    pub fn milli_value(&self) -> i128 {
        self.millis
    }

    /// Value in whole units, rounded up (`500m` → 1, `4Gi` → 4294967296).
    pub fn value(&self) -> i128 {
        let whole = self.millis / 1000;
        if self.millis % 1000 > 0 { whole + 1 } else { whole }
    }

    /// The string this quantity was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_suffix(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "Ki" => Scale::Binary(10),
        "Mi" => Scale::Binary(20),
        "Gi" => Scale::Binary(30),
        "Ti" => Scale::Binary(40),
        "Pi" => Scale::Binary(50),
        "Ei" => Scale::Binary(60),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        other => {
            let exp: i32 = EXPONENT_RE.captures(other)?[1].parse().ok()?;
            if exp.abs() > MAX_EXPONENT {
                return None;
            }
            Scale::Decimal(exp)
        }
    };
    Some(scale)
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(s: &str) -> i128 {
        Quantity::parse(s).unwrap().milli_value()
    }

    #[test]
    fn plain_integers() {
        assert_eq!(millis("2"), 2000);
        assert_eq!(millis("0"), 0);
        assert_eq!(millis("+3"), 3000);
        assert_eq!(millis("-1"), -1000);
    }

    #[test]
    fn decimal_suffixes() {
        assert_eq!(millis("500m"), 500);
        assert_eq!(millis("1k"), 1_000_000);
        assert_eq!(millis("2G"), 2_000_000_000_000);
        assert_eq!(millis("1.5"), 1500);
        assert_eq!(millis(".5"), 500);
    }

    #[test]
    fn binary_suffixes() {
        let q = Quantity::parse("4Gi").unwrap();
        assert_eq!(q.value(), 4 * 1024 * 1024 * 1024);
        assert_eq!(Quantity::parse("512Mi").unwrap().value(), 512 * 1024 * 1024);
        assert_eq!(Quantity::parse("1Ki").unwrap().value(), 1024);
    }

    #[test]
    fn exponents() {
        assert_eq!(Quantity::parse("1e3").unwrap().value(), 1000);
        assert_eq!(Quantity::parse("5E-3").unwrap().milli_value(), 5);
    }

    #[test]
    fn sub_milli_rounds_up() {
        assert_eq!(millis("1n"), 1);
        assert_eq!(Quantity::parse("500m").unwrap().value(), 1);
        assert_eq!(Quantity::parse("2").unwrap().value(), 2);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "notaquantity", "4GiB", "1.2.3", "Gi", "1 Gi", "--1", "1e", "4gi"] {
            assert!(
                matches!(Quantity::parse(bad), Err(QuantityError::Format(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn rejects_out_of_range() {
        let huge = "9".repeat(40);
        assert!(matches!(Quantity::parse(&huge), Err(QuantityError::OutOfRange(_))));
        assert!(Quantity::parse("1e99").is_err());
    }

    #[test]
    fn display_keeps_original_text() {
        let q: Quantity = "4Gi".parse().unwrap();
        assert_eq!(q.to_string(), "4Gi");
        assert_eq!(q.as_str(), "4Gi");
    }
}
