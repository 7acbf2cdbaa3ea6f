//! Rupiah amounts.

use serde::{Deserialize, Serialize};

/// An amount of Indonesian rupiah.
///
/// The gateway settles IDR in whole rupiah (no minor unit), so the amount is
/// stored as a plain integer. Serializes as a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Currency code sent to the payment gateway.
    pub const CURRENCY: &'static str = "IDR";

    /// Creates an amount from whole rupiah.
    pub const fn from_rupiah(rupiah: i64) -> Self {
        Self(rupiah)
    }

    /// Returns zero rupiah.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in whole rupiah.
    pub fn rupiah(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

/// Formats with Indonesian thousands separators, e.g. `Rp150.000`.
impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-Rp{grouped}")
        } else {
            write!(f, "Rp{grouped}")
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::from_rupiah(0).to_string(), "Rp0");
        assert_eq!(Money::from_rupiah(999).to_string(), "Rp999");
        assert_eq!(Money::from_rupiah(1_000).to_string(), "Rp1.000");
        assert_eq!(Money::from_rupiah(150_000).to_string(), "Rp150.000");
        assert_eq!(Money::from_rupiah(1_250_000).to_string(), "Rp1.250.000");
        assert_eq!(Money::from_rupiah(-4_500).to_string(), "-Rp4.500");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_rupiah(100_000);
        let b = Money::from_rupiah(25_000);
        assert_eq!((a + b).rupiah(), 125_000);
        assert_eq!((a - b).rupiah(), 75_000);

        let mut c = a;
        c += b;
        assert_eq!(c.rupiah(), 125_000);
    }

    #[test]
    fn test_sum() {
        let prices = [
            Money::from_rupiah(150_000),
            Money::from_rupiah(75_000),
            Money::from_rupiah(5_000),
        ];
        let total: Money = prices.iter().sum();
        assert_eq!(total, Money::from_rupiah(230_000));

        let empty: Money = std::iter::empty::<Money>().sum();
        assert!(empty.is_zero());
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&Money::from_rupiah(4_500)).unwrap();
        assert_eq!(json, "4500");
        let money: Money = serde_json::from_str("12000").unwrap();
        assert_eq!(money.rupiah(), 12_000);
    }

    #[test]
    fn test_sign_predicates() {
        assert!(Money::from_rupiah(1).is_positive());
        assert!(Money::zero().is_zero());
        assert!(Money::from_rupiah(-1).is_negative());
    }
}
