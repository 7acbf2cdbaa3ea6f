//! Deciding what cancelling an order does to its payment.

use crate::error::DomainError;
use crate::status::{OrderStatus, PaymentStatus};

/// Gateway-side action and resulting payment state for a cancellation.
///
/// ```text
/// payment PENDING  ──► expire charge ──► FAILED   + cancellation
/// payment SUCCESS  ──► refund        ──► REFUNDED + cancellation + refund
/// anything else    ──► order only
/// ```
///
/// In every case the order and its work status become `CANCELLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationPlan {
    /// Expire the unpaid invoice or payment method at the gateway.
    ExpireCharge,
    /// Refund the captured amount through the gateway.
    Refund,
    /// The payment is already settled; only the order changes.
    OrderOnly,
}

impl CancellationPlan {
    /// Picks the plan, rejecting orders that are already completed or cancelled.
    pub fn for_order(
        order_status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<Self, DomainError> {
        if !order_status.can_cancel() {
            return Err(DomainError::NotCancellable(order_status));
        }

        Ok(match payment_status {
            PaymentStatus::Pending => CancellationPlan::ExpireCharge,
            PaymentStatus::Success => CancellationPlan::Refund,
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded => {
                CancellationPlan::OrderOnly
            }
        })
    }

    /// The transaction's new payment status, if it changes.
    pub fn payment_status_after(&self) -> Option<PaymentStatus> {
        match self {
            CancellationPlan::ExpireCharge => Some(PaymentStatus::Failed),
            CancellationPlan::Refund => Some(PaymentStatus::Refunded),
            CancellationPlan::OrderOnly => None,
        }
    }

    pub fn records_cancellation(&self) -> bool {
        !matches!(self, CancellationPlan::OrderOnly)
    }

    pub fn records_refund(&self) -> bool {
        matches!(self, CancellationPlan::Refund)
    }
}
