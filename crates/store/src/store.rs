use async_trait::async_trait;
use common::{
    CarServiceId, ETicketId, OrderId, Page, PageRequest, PaymentMethodId, Sort, TransactionId,
    UserId,
};
use domain::{
    Cancellation, CarService, ETicket, GatewayEvent, Order, PaymentDetail, PaymentMethod,
    PaymentMethodDraft, PaymentStatus, PaymentTransition, Refund, Transaction, TransactionDetails,
    User,
};

use crate::query::{OrderFilter, TicketFilter, TransactionFilter};
use crate::{Result, StoreError};

/// Everything a checkout persists, written atomically.
#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub transaction: Transaction,
    pub order: Order,
    pub payment_detail: PaymentDetail,
}

/// The writes of a cancellation, applied atomically.
///
/// The order and its work status always become `CANCELLED`; the other
/// fields are only written when present. Nothing is written if the
/// transaction's payment status is no longer `expected_payment_status`.
#[derive(Debug, Clone)]
pub struct OrderCancellation {
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    /// The payment status the cancellation was planned against.
    pub expected_payment_status: PaymentStatus,
    pub payment_status: Option<PaymentStatus>,
    pub cancellation: Option<Cancellation>,
    pub refund: Option<Refund>,
}

/// Result of applying a gateway callback.
#[derive(Debug, Clone)]
pub struct PaymentUpdateOutcome {
    pub transaction: Transaction,
    pub orders: Vec<Order>,
    /// The ticket issued by this callback, if any.
    pub ticket: Option<ETicket>,
    /// `None` when the callback status causes no change.
    pub transition: Option<PaymentTransition>,
}

/// Persistence for the marketplace.
///
/// All implementations must be thread-safe (Send + Sync). Every method that
/// writes more than one row does so atomically.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Users and catalog (read-only) --

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Returns the services that exist among `ids`, in no particular order.
    async fn find_car_services(&self, ids: &[CarServiceId]) -> Result<Vec<CarService>>;

    // -- Payment methods --

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>>;

    async fn list_payment_methods(
        &self,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<PaymentMethod>>;

    /// Fails with `Duplicate` if the name is taken.
    async fn create_payment_method(&self, draft: PaymentMethodDraft) -> Result<PaymentMethod>;

    /// Replaces a method and its channel configs. Fails with `Duplicate` if
    /// the new name is taken by another method.
    async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        draft: PaymentMethodDraft,
    ) -> Result<Option<PaymentMethod>>;

    /// Fails with `ForeignKey` while transactions still reference the method.
    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool>;

    // -- Orders --

    /// Persists a transaction, its order, and the payment detail in one
    /// database transaction.
    async fn create_checkout(&self, checkout: NewCheckout) -> Result<TransactionDetails>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Order>>;

    /// Saves note, statuses and `updated_at` of an existing order.
    async fn update_order(&self, order: &Order) -> Result<Option<Order>>;

    async fn delete_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Cancels an order and records what happened to its payment.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) when
    /// the payment status changed since the cancellation was planned.
    async fn cancel_order(&self, cancellation: OrderCancellation) -> Result<Order>;

    // -- Transactions --

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<TransactionDetails>>;

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<TransactionDetails>>;

    async fn delete_transaction(&self, id: TransactionId) -> Result<bool>;

    /// Applies a gateway callback to a transaction and its orders.
    ///
    /// Runs under serializable isolation: the snapshot is read, the
    /// transition decided with [`domain::resolve_transition`], and any e-ticket
    /// numbered as `max + 1`, all in one database transaction. A concurrent
    /// writer makes this fail with [`StoreError::Conflict`]; callers retry.
    async fn apply_payment_update(
        &self,
        id: TransactionId,
        event: &GatewayEvent,
    ) -> Result<PaymentUpdateOutcome>;

    // -- E-tickets --

    async fn get_e_ticket(&self, id: ETicketId) -> Result<Option<ETicket>>;

    async fn list_e_tickets(
        &self,
        filter: &TicketFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<ETicket>>;

    async fn delete_e_ticket(&self, id: ETicketId) -> Result<bool>;
}

/// Extension trait turning missing rows into `NotFound` errors.
#[async_trait]
pub trait StoreExt: Store {
    async fn require_user(&self, id: UserId) -> Result<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| StoreError::not_found("User", id))
    }

    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    async fn require_transaction(&self, id: TransactionId) -> Result<TransactionDetails> {
        self.get_transaction(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Transaction", id))
    }

    async fn require_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod> {
        self.get_payment_method(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Payment method", id))
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
