//! Persistent records of the marketplace.
//!
//! Field names serialize in camelCase, the shape clients of the REST API expect.

use chrono::{DateTime, Utc};
use common::{
    CarServiceId, ETicketId, Money, OrderId, PaymentMethodId, TransactionId, UserCarId, UserId,
    WorkshopId,
};
use serde::{Deserialize, Serialize};

use crate::commands::UpdateOrder;
use crate::error::DomainError;
use crate::status::{
    CancellationReason, OrderStatus, PaymentMethodType, PaymentReusability, PaymentStatus, Role,
    WorkStatus,
};

/// A registered user. Managed by the authentication service; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workshop {
    pub id: WorkshopId,
    pub name: String,
    pub address: String,
}

/// A vehicle registered by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCar {
    pub id: UserCarId,
    pub user_id: UserId,
    pub plate_number: String,
}

/// A priced service from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarService {
    pub id: CarServiceId,
    pub name: String,
    pub price: Money,
}

/// E-wallet channel settings for payment-request checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EWalletConfig {
    /// Gateway channel code, e.g. `OVO` or `DANA`.
    pub channel_code: String,
    pub success_return_url: String,
    pub failure_return_url: String,
}

/// Virtual-account channel settings for payment-request checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAccountConfig {
    /// Gateway channel code of the bank, e.g. `BCA`.
    pub bank_code: String,
    pub bank_name: String,
    pub account_pattern: Option<String>,
}

/// A way to pay that customers can pick at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    /// Unique; also the channel name sent in invoice requests.
    pub name: String,
    #[serde(rename = "type")]
    pub method_type: PaymentMethodType,
    pub reusability: PaymentReusability,
    /// Flat fee added to the order total.
    pub fee: Money,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub is_active: bool,
    pub e_wallet_payment_config: Option<EWalletConfig>,
    pub virtual_account_config: Option<VirtualAccountConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The payment record for one checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub payment_method_id: PaymentMethodId,
    pub admin_fee: Money,
    pub total_price: Money,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gateway references and customer-facing URLs of a transaction.
///
/// Invoice checkouts fill `xendit_invoice_id` and `web_url`; payment-request
/// checkouts fill the payment-request/method ids and whichever action URLs or
/// virtual-account number the channel returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetail {
    pub xendit_invoice_id: Option<String>,
    pub xendit_payment_request_id: Option<String>,
    pub xendit_payment_method_id: Option<String>,
    pub web_url: Option<String>,
    pub mobile_url: Option<String>,
    pub deeplink_url: Option<String>,
    pub virtual_account_number: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub reason: CancellationReason,
    pub notes: Option<String>,
    pub cancelled_by_id: UserId,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub amount: Money,
    pub reason: String,
    pub refunded_by_id: UserId,
    pub refunded_at: DateTime<Utc>,
}

/// A customer's request for one or more services at a workshop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub user_car_id: UserCarId,
    pub workshop_id: WorkshopId,
    pub transaction_id: TransactionId,
    pub note: Option<String>,
    pub subtotal_price: Money,
    pub order_status: OrderStatus,
    pub work_status: WorkStatus,
    pub car_service_ids: Vec<CarServiceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Applies a back-office edit. Closed orders keep their status.
    pub fn apply_update(
        &self,
        update: UpdateOrder,
        now: DateTime<Utc>,
    ) -> Result<Order, DomainError> {
        let changes_status = update
            .order_status
            .is_some_and(|status| status != self.order_status)
            || update
                .work_status
                .is_some_and(|status| status != self.work_status);
        if changes_status && self.order_status.is_terminal() {
            return Err(DomainError::OrderClosed(self.order_status));
        }

        let mut order = self.clone();
        if let Some(note) = update.note {
            order.note = Some(note);
        }
        if let Some(status) = update.order_status {
            order.order_status = status;
        }
        if let Some(status) = update.work_status {
            order.work_status = status;
        }
        order.updated_at = now;
        Ok(order)
    }
}

/// A sequential ticket handed to the customer once payment succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ETicket {
    pub id: ETicketId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub ticket_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction with everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub payment_method: Option<PaymentMethod>,
    pub payment_detail: Option<PaymentDetail>,
    pub cancellation: Option<Cancellation>,
    pub refund: Option<Refund>,
    pub orders: Vec<Order>,
    pub e_tickets: Vec<ETicket>,
}

impl TransactionDetails {
    /// The order of this transaction. Checkouts always create exactly one.
    pub fn primary_order(&self) -> Option<&Order> {
        self.orders.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            user_id: UserId::new(),
            user_car_id: UserCarId::new(),
            workshop_id: WorkshopId::new(),
            transaction_id: TransactionId::new(),
            note: None,
            subtotal_price: Money::from_rupiah(150_000),
            order_status: status,
            work_status: WorkStatus::Queued,
            car_service_ids: vec![CarServiceId::new()],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_apply_update_changes_fields() {
        let original = order(OrderStatus::Draft);
        let updated = original
            .apply_update(
                UpdateOrder {
                    note: Some("bring spare keys".to_string()),
                    order_status: Some(OrderStatus::Confirmed),
                    work_status: Some(WorkStatus::Inspection),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(updated.note.as_deref(), Some("bring spare keys"));
        assert_eq!(updated.order_status, OrderStatus::Confirmed);
        assert_eq!(updated.work_status, WorkStatus::Inspection);
        assert_eq!(updated.id, original.id);
    }

    #[test]
    fn test_apply_update_rejects_status_change_on_closed_order() {
        let closed = order(OrderStatus::Cancelled);
        let err = closed
            .apply_update(
                UpdateOrder {
                    order_status: Some(OrderStatus::Processing),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::OrderClosed(OrderStatus::Cancelled)));

        // Notes stay editable.
        let noted = closed
            .apply_update(
                UpdateOrder {
                    note: Some("refund sent".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(noted.note.as_deref(), Some("refund sent"));
    }

    #[test]
    fn test_transaction_details_flattens_transaction() {
        let now = Utc::now();
        let details = TransactionDetails {
            transaction: Transaction {
                id: TransactionId::new(),
                user_id: UserId::new(),
                payment_method_id: PaymentMethodId::new(),
                admin_fee: Money::zero(),
                total_price: Money::from_rupiah(154_500),
                payment_status: PaymentStatus::Pending,
                created_at: now,
                updated_at: now,
            },
            payment_method: None,
            payment_detail: Some(PaymentDetail::default()),
            cancellation: None,
            refund: None,
            orders: vec![],
            e_tickets: vec![],
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["paymentStatus"], "PENDING");
        assert_eq!(json["totalPrice"], 154_500);
        assert!(json["paymentDetail"].is_object());
        assert!(details.primary_order().is_none());
    }
}
