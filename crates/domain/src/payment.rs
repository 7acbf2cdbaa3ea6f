//! Payment state machine driven by gateway callbacks.
//!
//! The gateway reports charge status changes asynchronously. Stores load a
//! [`PaymentSnapshot`] inside a serializable database transaction, ask
//! [`resolve_transition`] what to do, and apply the returned
//! [`PaymentTransition`] before committing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{OrderStatus, PaymentStatus};

/// Charge status as reported by a gateway webhook.
///
/// Invoice callbacks report `PAID`/`EXPIRED`; payment-request callbacks
/// report `SUCCEEDED`/`EXPIRED`/`STOPPED`. Anything else (for example
/// `SETTLED` or `PENDING`) is kept verbatim and acknowledged without changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GatewayStatus {
    Paid,
    Succeeded,
    Expired,
    Stopped,
    Other(String),
}

impl GatewayStatus {
    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Paid => "PAID",
            GatewayStatus::Succeeded => "SUCCEEDED",
            GatewayStatus::Expired => "EXPIRED",
            GatewayStatus::Stopped => "STOPPED",
            GatewayStatus::Other(s) => s,
        }
    }

    /// Returns true if the charge has been captured.
    pub fn is_success(&self) -> bool {
        matches!(self, GatewayStatus::Paid | GatewayStatus::Succeeded)
    }
}

impl From<&str> for GatewayStatus {
    fn from(s: &str) -> Self {
        match s {
            "PAID" => GatewayStatus::Paid,
            "SUCCEEDED" => GatewayStatus::Succeeded,
            "EXPIRED" => GatewayStatus::Expired,
            "STOPPED" => GatewayStatus::Stopped,
            _ => GatewayStatus::Other(s.to_string()),
        }
    }
}

impl From<String> for GatewayStatus {
    fn from(s: String) -> Self {
        GatewayStatus::from(s.as_str())
    }
}

impl From<GatewayStatus> for String {
    fn from(status: GatewayStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized webhook callback, independent of the payload flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    /// The `external_id` / `reference_id` the charge was created with.
    pub reference: String,
    pub status: GatewayStatus,
    /// When the gateway captured the money, if the payload says.
    pub paid_at: Option<DateTime<Utc>>,
}

/// What the store knows about a transaction when a callback arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSnapshot {
    pub payment_status: PaymentStatus,
    pub has_cancellation: bool,
    pub has_refund: bool,
    /// True if the transaction's order already holds an e-ticket.
    pub ticket_issued: bool,
}

/// The state change a callback causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTransition {
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// Issue the next sequential e-ticket for the transaction's order.
    pub issue_ticket: bool,
    /// Record this capture time on the payment detail.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Decides how a callback changes a transaction and its order.
///
/// | callback              | transaction                                   | order       |
/// |-----------------------|-----------------------------------------------|-------------|
/// | `PAID` / `SUCCEEDED`  | `SUCCESS`, issue ticket                       | `DRAFT`     |
/// | `EXPIRED`             | `REFUNDED` if cancelled and refunded, `FAILED` if only cancelled, else `EXPIRED` | `CANCELLED` |
/// | `STOPPED`             | `FAILED`                                      | `CANCELLED` |
/// | anything else         | unchanged (`None`)                            | unchanged   |
///
/// A redelivered success callback never issues a second ticket for the same
/// order.
pub fn resolve_transition(
    event: &GatewayEvent,
    snapshot: &PaymentSnapshot,
) -> Option<PaymentTransition> {
    match event.status {
        GatewayStatus::Paid | GatewayStatus::Succeeded => Some(PaymentTransition {
            payment_status: PaymentStatus::Success,
            order_status: OrderStatus::Draft,
            issue_ticket: !snapshot.ticket_issued,
            paid_at: event.paid_at,
        }),
        GatewayStatus::Expired => {
            let payment_status = match (snapshot.has_cancellation, snapshot.has_refund) {
                (true, true) => PaymentStatus::Refunded,
                (true, false) => PaymentStatus::Failed,
                (false, _) => PaymentStatus::Expired,
            };
            Some(PaymentTransition {
                payment_status,
                order_status: OrderStatus::Cancelled,
                issue_ticket: false,
                paid_at: None,
            })
        }
        GatewayStatus::Stopped => Some(PaymentTransition {
            payment_status: PaymentStatus::Failed,
            order_status: OrderStatus::Cancelled,
            issue_ticket: false,
            paid_at: None,
        }),
        GatewayStatus::Other(_) => None,
    }
}

/// Ticket numbers start at 1 and grow by one across the whole system.
pub fn next_ticket_number(current_max: Option<i64>) -> i64 {
    current_max.unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: &str) -> GatewayEvent {
        GatewayEvent {
            reference: "ref".to_string(),
            status: GatewayStatus::from(status),
            paid_at: None,
        }
    }

    fn snapshot(has_cancellation: bool, has_refund: bool) -> PaymentSnapshot {
        PaymentSnapshot {
            payment_status: PaymentStatus::Pending,
            has_cancellation,
            has_refund,
            ticket_issued: false,
        }
    }

    #[test]
    fn test_gateway_status_parsing() {
        assert_eq!(GatewayStatus::from("PAID"), GatewayStatus::Paid);
        assert_eq!(GatewayStatus::from("SUCCEEDED"), GatewayStatus::Succeeded);
        assert_eq!(
            GatewayStatus::from("SETTLED"),
            GatewayStatus::Other("SETTLED".to_string())
        );

        let json: GatewayStatus = serde_json::from_str("\"STOPPED\"").unwrap();
        assert_eq!(json, GatewayStatus::Stopped);
        assert_eq!(serde_json::to_string(&json).unwrap(), "\"STOPPED\"");
    }

    #[test]
    fn test_gateway_status_must_match_exactly() {
        for raw in ["paid", " SUCCEEDED ", "Expired"] {
            assert_eq!(GatewayStatus::from(raw), GatewayStatus::Other(raw.to_string()));
            assert!(resolve_transition(&event(raw), &snapshot(false, false)).is_none());
        }
    }

    #[test]
    fn test_paid_and_succeeded_mark_success_and_issue_ticket() {
        for status in ["PAID", "SUCCEEDED"] {
            let transition = resolve_transition(&event(status), &snapshot(false, false)).unwrap();
            assert_eq!(transition.payment_status, PaymentStatus::Success);
            assert_eq!(transition.order_status, OrderStatus::Draft);
            assert!(transition.issue_ticket);
        }
    }

    #[test]
    fn test_success_carries_paid_at() {
        let paid_at = Utc::now();
        let mut event = event("SUCCEEDED");
        event.paid_at = Some(paid_at);
        let transition = resolve_transition(&event, &snapshot(false, false)).unwrap();
        assert_eq!(transition.paid_at, Some(paid_at));
    }

    #[test]
    fn test_redelivered_success_does_not_issue_second_ticket() {
        let mut snap = snapshot(false, false);
        snap.payment_status = PaymentStatus::Success;
        snap.ticket_issued = true;
        let transition = resolve_transition(&event("PAID"), &snap).unwrap();
        assert_eq!(transition.payment_status, PaymentStatus::Success);
        assert!(!transition.issue_ticket);
    }

    #[test]
    fn test_expired_branches_on_cancellation_and_refund() {
        let cases = [
            ((true, true), PaymentStatus::Refunded),
            ((true, false), PaymentStatus::Failed),
            ((false, false), PaymentStatus::Expired),
            ((false, true), PaymentStatus::Expired),
        ];
        for ((cancelled, refunded), expected) in cases {
            let transition =
                resolve_transition(&event("EXPIRED"), &snapshot(cancelled, refunded)).unwrap();
            assert_eq!(transition.payment_status, expected);
            assert_eq!(transition.order_status, OrderStatus::Cancelled);
            assert!(!transition.issue_ticket);
        }
    }

    #[test]
    fn test_stopped_fails_payment() {
        let transition = resolve_transition(&event("STOPPED"), &snapshot(false, false)).unwrap();
        assert_eq!(transition.payment_status, PaymentStatus::Failed);
        assert_eq!(transition.order_status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_other_statuses_are_ignored() {
        assert!(resolve_transition(&event("SETTLED"), &snapshot(false, false)).is_none());
        assert!(resolve_transition(&event("ACTIVE"), &snapshot(false, false)).is_none());
    }

    #[test]
    fn test_next_ticket_number() {
        assert_eq!(next_ticket_number(None), 1);
        assert_eq!(next_ticket_number(Some(41)), 42);
    }
}
