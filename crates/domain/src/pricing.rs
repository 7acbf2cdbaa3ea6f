//! Order pricing.

use common::Money;
use serde::Serialize;

/// Platform fee charged on every order. Currently waived.
pub const ADMIN_FEE: Money = Money::zero();

/// Price breakdown of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
    /// Sum of the selected service prices.
    pub subtotal: Money,
    pub admin_fee: Money,
    /// Flat fee of the chosen payment method.
    pub payment_fee: Money,
    /// Amount charged through the gateway.
    pub total: Money,
}

impl OrderQuote {
    pub fn new(service_prices: impl IntoIterator<Item = Money>, payment_fee: Money) -> Self {
        let subtotal: Money = service_prices.into_iter().sum();
        Self {
            subtotal,
            admin_fee: ADMIN_FEE,
            payment_fee,
            total: subtotal + ADMIN_FEE + payment_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_includes_payment_fee() {
        let quote = OrderQuote::new(
            [Money::from_rupiah(150_000), Money::from_rupiah(350_000)],
            Money::from_rupiah(4_500),
        );
        assert_eq!(quote.subtotal, Money::from_rupiah(500_000));
        assert_eq!(quote.admin_fee, Money::zero());
        assert_eq!(quote.total, Money::from_rupiah(504_500));
    }

    #[test]
    fn test_free_payment_method() {
        let quote = OrderQuote::new([Money::from_rupiah(75_000)], Money::zero());
        assert_eq!(quote.total, quote.subtotal);
    }
}
