//! Walks an order through checkout, gateway callbacks and cancellation using
//! only the domain rules, the way a store would apply them.

use chrono::Utc;
use common::{CarServiceId, Money, OrderId, TransactionId, UserCarId, UserId, WorkshopId};
use domain::{
    CancellationPlan, CreateOrder, DomainError, GatewayEvent, GatewayStatus, Order, OrderQuote,
    OrderStatus, PaymentSnapshot, PaymentStatus, UpdateOrder, WorkStatus, next_ticket_number,
    resolve_transition,
};

/// Mirrors what a store keeps for one checkout.
struct Ledger {
    order: Order,
    payment_status: PaymentStatus,
    has_cancellation: bool,
    has_refund: bool,
    tickets: Vec<i64>,
}

impl Ledger {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            order: Order {
                id: OrderId::new(),
                user_id: UserId::new(),
                user_car_id: UserCarId::new(),
                workshop_id: WorkshopId::new(),
                transaction_id: TransactionId::new(),
                note: None,
                subtotal_price: Money::from_rupiah(300_000),
                order_status: OrderStatus::Draft,
                work_status: WorkStatus::Queued,
                car_service_ids: vec![CarServiceId::new()],
                created_at: now,
                updated_at: now,
            },
            payment_status: PaymentStatus::Pending,
            has_cancellation: false,
            has_refund: false,
            tickets: Vec::new(),
        }
    }

    fn snapshot(&self) -> PaymentSnapshot {
        PaymentSnapshot {
            payment_status: self.payment_status,
            has_cancellation: self.has_cancellation,
            has_refund: self.has_refund,
            ticket_issued: !self.tickets.is_empty(),
        }
    }

    /// Applies a callback; `issued_so_far` is the highest ticket in the system.
    fn callback(&mut self, status: &str, issued_so_far: Option<i64>) -> Option<i64> {
        let event = GatewayEvent {
            reference: self.order.transaction_id.to_string(),
            status: GatewayStatus::from(status),
            paid_at: None,
        };
        let transition = resolve_transition(&event, &self.snapshot())?;
        self.payment_status = transition.payment_status;
        self.order.order_status = transition.order_status;
        if transition.issue_ticket {
            let number = next_ticket_number(issued_so_far);
            self.tickets.push(number);
            return Some(number);
        }
        None
    }

    fn cancel(&mut self) -> Result<CancellationPlan, DomainError> {
        let plan = CancellationPlan::for_order(self.order.order_status, self.payment_status)?;
        if let Some(status) = plan.payment_status_after() {
            self.payment_status = status;
        }
        self.has_cancellation |= plan.records_cancellation();
        self.has_refund |= plan.records_refund();
        self.order.order_status = OrderStatus::Cancelled;
        self.order.work_status = WorkStatus::Cancelled;
        Ok(plan)
    }
}

mod checkout {
    use super::*;

    #[test]
    fn quote_charges_services_plus_method_fee() {
        let quote = OrderQuote::new(
            [Money::from_rupiah(150_000), Money::from_rupiah(350_000)],
            Money::from_rupiah(4_500),
        );
        assert_eq!(quote.subtotal, Money::from_rupiah(500_000));
        assert_eq!(quote.total, Money::from_rupiah(504_500));
    }

    #[test]
    fn create_order_reports_every_missing_field() {
        let err = CreateOrder::default().validate().unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            ["userCarId", "workshopId", "paymentMethodId", "carServices"]
        );
    }
}

mod callbacks {
    use super::*;

    #[test]
    fn paid_then_redelivered_issues_one_ticket() {
        let mut ledger = Ledger::new();

        assert_eq!(ledger.callback("PAID", None), Some(1));
        assert_eq!(ledger.payment_status, PaymentStatus::Success);
        assert_eq!(ledger.order.order_status, OrderStatus::Draft);

        assert_eq!(ledger.callback("PAID", Some(1)), None);
        assert_eq!(ledger.tickets, vec![1]);
    }

    #[test]
    fn tickets_continue_across_orders() {
        let mut first = Ledger::new();
        let mut second = Ledger::new();

        let a = first.callback("SUCCEEDED", None);
        let b = second.callback("SUCCEEDED", a);

        assert_eq!((a, b), (Some(1), Some(2)));
    }

    #[test]
    fn expiry_without_cancellation() {
        let mut ledger = Ledger::new();
        ledger.callback("EXPIRED", None);

        assert_eq!(ledger.payment_status, PaymentStatus::Expired);
        assert_eq!(ledger.order.order_status, OrderStatus::Cancelled);
    }

    #[test]
    fn unknown_status_changes_nothing() {
        let mut ledger = Ledger::new();
        ledger.callback("SETTLED", None);

        assert_eq!(ledger.payment_status, PaymentStatus::Pending);
        assert_eq!(ledger.order.order_status, OrderStatus::Draft);
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn cancelled_pending_order_stays_failed_after_expiry() {
        let mut ledger = Ledger::new();

        assert_eq!(ledger.cancel().unwrap(), CancellationPlan::ExpireCharge);
        assert_eq!(ledger.payment_status, PaymentStatus::Failed);

        ledger.callback("EXPIRED", None);
        assert_eq!(ledger.payment_status, PaymentStatus::Failed);
        assert_eq!(ledger.order.order_status, OrderStatus::Cancelled);
    }

    #[test]
    fn refunded_order_stays_refunded_after_expiry() {
        let mut ledger = Ledger::new();
        ledger.callback("PAID", None);

        assert_eq!(ledger.cancel().unwrap(), CancellationPlan::Refund);
        assert_eq!(ledger.payment_status, PaymentStatus::Refunded);

        ledger.callback("EXPIRED", Some(1));
        assert_eq!(ledger.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn second_cancel_is_rejected() {
        let mut ledger = Ledger::new();
        ledger.cancel().unwrap();

        let err = ledger.cancel().unwrap_err();
        assert!(matches!(err, DomainError::NotCancellable(OrderStatus::Cancelled)));
        assert_eq!(
            err.to_string(),
            "Order cannot be cancelled because it's already CANCELLED"
        );
    }

    #[test]
    fn cancelled_order_cannot_be_reopened() {
        let mut ledger = Ledger::new();
        ledger.cancel().unwrap();

        let update = UpdateOrder {
            order_status: Some(OrderStatus::Confirmed),
            ..UpdateOrder::default()
        };
        let err = ledger.order.apply_update(update, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::OrderClosed(OrderStatus::Cancelled)));
    }
}
