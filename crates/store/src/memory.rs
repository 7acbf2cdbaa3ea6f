use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CarServiceId, ETicketId, OrderId, Page, PageRequest, PaymentMethodId, Sort, SortDirection,
    TransactionId, UserCarId, UserId, WorkshopId,
};
use domain::{
    Cancellation, CarService, ETicket, GatewayEvent, Order, OrderStatus, PaymentDetail,
    PaymentMethod, PaymentMethodDraft, PaymentSnapshot, Refund, Transaction, TransactionDetails,
    User, UserCar, WorkStatus, Workshop, next_ticket_number, resolve_transition,
};
use tokio::sync::RwLock;

use crate::query::{OrderFilter, TicketFilter, TransactionFilter};
use crate::store::{NewCheckout, OrderCancellation, PaymentUpdateOutcome, Store};
use crate::{Result, StoreError};

#[derive(Debug, Clone)]
struct TransactionRow {
    transaction: Transaction,
    payment_detail: Option<PaymentDetail>,
    cancellation: Option<Cancellation>,
    refund: Option<Refund>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    workshops: HashMap<WorkshopId, Workshop>,
    user_cars: HashMap<UserCarId, UserCar>,
    car_services: HashMap<CarServiceId, CarService>,
    payment_methods: HashMap<PaymentMethodId, PaymentMethod>,
    transactions: HashMap<TransactionId, TransactionRow>,
    orders: HashMap<OrderId, Order>,
    e_tickets: HashMap<ETicketId, ETicket>,
}

impl Tables {
    fn orders_of(&self, transaction_id: TransactionId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.transaction_id == transaction_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    fn details(&self, row: &TransactionRow) -> TransactionDetails {
        let orders = self.orders_of(row.transaction.id);
        let mut e_tickets: Vec<ETicket> = self
            .e_tickets
            .values()
            .filter(|t| orders.iter().any(|o| o.id == t.order_id))
            .cloned()
            .collect();
        e_tickets.sort_by_key(|t| t.ticket_number);

        TransactionDetails {
            transaction: row.transaction.clone(),
            payment_method: self
                .payment_methods
                .get(&row.transaction.payment_method_id)
                .cloned(),
            payment_detail: row.payment_detail.clone(),
            cancellation: row.cancellation.clone(),
            refund: row.refund.clone(),
            orders,
            e_tickets,
        }
    }

    fn name_taken(&self, name: &str, except: Option<PaymentMethodId>) -> bool {
        self.payment_methods
            .values()
            .any(|m| m.name == name && Some(m.id) != except)
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn method_from_draft(
    id: PaymentMethodId,
    draft: PaymentMethodDraft,
    created_at: chrono::DateTime<Utc>,
) -> PaymentMethod {
    PaymentMethod {
        id,
        name: draft.name,
        method_type: draft.method_type,
        reusability: draft.reusability,
        fee: draft.fee,
        description: draft.description,
        logo_url: draft.logo_url,
        is_active: draft.is_active,
        e_wallet_payment_config: draft.e_wallet_payment_config,
        virtual_account_config: draft.virtual_account_config,
        created_at,
        updated_at: Utc::now(),
    }
}

/// In-memory store for tests and local development.
///
/// All tables live behind one lock, so every write is trivially serializable.
/// Catalog rows (users, workshops, vehicles, services) are seeded with the
/// `insert_*` methods.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    failing_payment_updates: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn insert_workshop(&self, workshop: Workshop) {
        self.tables
            .write()
            .await
            .workshops
            .insert(workshop.id, workshop);
    }

    pub async fn insert_user_car(&self, car: UserCar) {
        self.tables.write().await.user_cars.insert(car.id, car);
    }

    pub async fn insert_car_service(&self, service: CarService) {
        self.tables
            .write()
            .await
            .car_services
            .insert(service.id, service);
    }

    /// Makes the next `count` payment updates fail with a serialization conflict.
    pub fn fail_next_payment_updates(&self, count: u32) {
        self.failing_payment_updates
            .store(count, AtomicOrdering::SeqCst);
    }

    /// Returns the total number of e-tickets issued.
    pub async fn ticket_count(&self) -> usize {
        self.tables.read().await.e_tickets.len()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_payment_updates
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_car_services(&self, ids: &[CarServiceId]) -> Result<Vec<CarService>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.car_services.get(id).cloned())
            .collect())
    }

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        Ok(self.tables.read().await.payment_methods.get(&id).cloned())
    }

    async fn list_payment_methods(
        &self,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<PaymentMethod>> {
        let tables = self.tables.read().await;
        let mut methods: Vec<PaymentMethod> = tables.payment_methods.values().cloned().collect();
        methods.sort_by(|a, b| {
            let ordering = match sort.field {
                "updatedAt" => a.updated_at.cmp(&b.updated_at),
                "name" => a.name.cmp(&b.name),
                "fee" => a.fee.cmp(&b.fee),
                _ => a.created_at.cmp(&b.created_at),
            };
            directed(ordering, sort.direction)
        });
        Ok(Page::from_slice(methods, page))
    }

    async fn create_payment_method(&self, draft: PaymentMethodDraft) -> Result<PaymentMethod> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(&draft.name, None) {
            return Err(StoreError::Duplicate("Payment Method".to_string()));
        }
        let method = method_from_draft(PaymentMethodId::new(), draft, Utc::now());
        tables.payment_methods.insert(method.id, method.clone());
        Ok(method)
    }

    async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        draft: PaymentMethodDraft,
    ) -> Result<Option<PaymentMethod>> {
        let mut tables = self.tables.write().await;
        let Some(created_at) = tables.payment_methods.get(&id).map(|m| m.created_at) else {
            return Ok(None);
        };
        if tables.name_taken(&draft.name, Some(id)) {
            return Err(StoreError::Duplicate("Payment Method".to_string()));
        }
        let method = method_from_draft(id, draft, created_at);
        tables.payment_methods.insert(id, method.clone());
        Ok(Some(method))
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .transactions
            .values()
            .any(|row| row.transaction.payment_method_id == id)
        {
            return Err(StoreError::ForeignKey(
                "transactions_payment_method_id_fkey".to_string(),
            ));
        }
        Ok(tables.payment_methods.remove(&id).is_some())
    }

    async fn create_checkout(&self, checkout: NewCheckout) -> Result<TransactionDetails> {
        let mut tables = self.tables.write().await;
        let NewCheckout {
            transaction,
            order,
            payment_detail,
        } = checkout;

        // Simulate the foreign keys of the relational schema.
        let missing = if !tables.users.contains_key(&transaction.user_id) {
            Some("transactions_user_id_fkey")
        } else if !tables
            .payment_methods
            .contains_key(&transaction.payment_method_id)
        {
            Some("transactions_payment_method_id_fkey")
        } else if !tables.user_cars.contains_key(&order.user_car_id) {
            Some("orders_user_car_id_fkey")
        } else if !tables.workshops.contains_key(&order.workshop_id) {
            Some("orders_workshop_id_fkey")
        } else if order
            .car_service_ids
            .iter()
            .any(|id| !tables.car_services.contains_key(id))
        {
            Some("order_car_services_car_service_id_fkey")
        } else {
            None
        };
        if let Some(constraint) = missing {
            return Err(StoreError::ForeignKey(constraint.to_string()));
        }
        if tables.transactions.contains_key(&transaction.id) {
            return Err(StoreError::Duplicate(format!("Transaction {}", transaction.id)));
        }

        let row = TransactionRow {
            transaction,
            payment_detail: Some(payment_detail),
            cancellation: None,
            refund: None,
        };
        tables.orders.insert(order.id, order);
        let details = tables.details(&row);
        tables.transactions.insert(row.transaction.id, row);
        Ok(details)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.user_id.is_none_or(|id| o.user_id == id))
            .filter(|o| filter.workshop_id.is_none_or(|id| o.workshop_id == id))
            .filter(|o| filter.order_status.is_none_or(|s| o.order_status == s))
            .filter(|o| filter.work_status.is_none_or(|s| o.work_status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            let ordering = match sort.field {
                "updatedAt" => a.updated_at.cmp(&b.updated_at),
                _ => a.created_at.cmp(&b.created_at),
            };
            directed(ordering, sort.direction)
        });
        Ok(Page::from_slice(orders, page))
    }

    async fn update_order(&self, order: &Order) -> Result<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.orders.get_mut(&order.id) else {
            return Ok(None);
        };
        existing.note = order.note.clone();
        existing.order_status = order.order_status;
        existing.work_status = order.work_status;
        existing.updated_at = order.updated_at;
        Ok(Some(existing.clone()))
    }

    async fn delete_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut tables = self.tables.write().await;
        let removed = tables.orders.remove(&id);
        if removed.is_some() {
            tables.e_tickets.retain(|_, t| t.order_id != id);
        }
        Ok(removed)
    }

    async fn cancel_order(&self, cancellation: OrderCancellation) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let current = tables
            .transactions
            .get(&cancellation.transaction_id)
            .map(|row| row.transaction.payment_status)
            .ok_or_else(|| StoreError::not_found("Transaction", cancellation.transaction_id))?;
        if current != cancellation.expected_payment_status {
            return Err(StoreError::payment_status_changed(
                cancellation.expected_payment_status,
                current,
            ));
        }
        let now = Utc::now();

        let order = tables
            .orders
            .get_mut(&cancellation.order_id)
            .ok_or_else(|| StoreError::not_found("Order", cancellation.order_id))?;
        order.order_status = OrderStatus::Cancelled;
        order.work_status = WorkStatus::Cancelled;
        order.updated_at = now;
        let order = order.clone();

        if let Some(row) = tables.transactions.get_mut(&cancellation.transaction_id) {
            if let Some(status) = cancellation.payment_status {
                row.transaction.payment_status = status;
                row.transaction.updated_at = now;
            }
            if cancellation.cancellation.is_some() {
                row.cancellation = cancellation.cancellation;
            }
            if cancellation.refund.is_some() {
                row.refund = cancellation.refund;
            }
        }
        Ok(order)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<TransactionDetails>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(&id).map(|row| tables.details(row)))
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<TransactionDetails>> {
        let tables = self.tables.read().await;
        let method_name = filter.payment_method_name.as_deref().map(str::to_lowercase);
        let mut rows: Vec<&TransactionRow> = tables
            .transactions
            .values()
            .filter(|r| filter.user_id.is_none_or(|id| r.transaction.user_id == id))
            .filter(|r| {
                filter
                    .payment_status
                    .is_none_or(|s| r.transaction.payment_status == s)
            })
            .filter(|r| {
                method_name.as_deref().is_none_or(|name| {
                    tables
                        .payment_methods
                        .get(&r.transaction.payment_method_id)
                        .is_some_and(|m| m.name.to_lowercase() == name)
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            let (a, b) = (&a.transaction, &b.transaction);
            let ordering = match sort.field {
                "updatedAt" => a.updated_at.cmp(&b.updated_at),
                "totalPrice" => a.total_price.cmp(&b.total_price),
                _ => a.created_at.cmp(&b.created_at),
            };
            directed(ordering, sort.direction)
        });
        let details: Vec<TransactionDetails> = rows.into_iter().map(|r| tables.details(r)).collect();
        Ok(Page::from_slice(details, page))
    }

    async fn delete_transaction(&self, id: TransactionId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.transactions.remove(&id).is_none() {
            return Ok(false);
        }
        let order_ids: Vec<OrderId> = tables
            .orders
            .values()
            .filter(|o| o.transaction_id == id)
            .map(|o| o.id)
            .collect();
        tables.orders.retain(|_, o| o.transaction_id != id);
        tables
            .e_tickets
            .retain(|_, t| !order_ids.contains(&t.order_id));
        Ok(true)
    }

    async fn apply_payment_update(
        &self,
        id: TransactionId,
        event: &GatewayEvent,
    ) -> Result<PaymentUpdateOutcome> {
        if self.take_injected_failure() {
            return Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        let row = tables
            .transactions
            .get(&id)
            .ok_or_else(|| StoreError::not_found("Transaction", id))?;
        let orders = tables.orders_of(id);
        let primary_order = orders.first().map(|o| o.id);
        let snapshot = PaymentSnapshot {
            payment_status: row.transaction.payment_status,
            has_cancellation: row.cancellation.is_some(),
            has_refund: row.refund.is_some(),
            ticket_issued: primary_order
                .is_some_and(|order_id| tables.e_tickets.values().any(|t| t.order_id == order_id)),
        };

        let Some(transition) = resolve_transition(event, &snapshot) else {
            return Ok(PaymentUpdateOutcome {
                transaction: row.transaction.clone(),
                orders,
                ticket: None,
                transition: None,
            });
        };

        let now = Utc::now();
        let row = tables
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Transaction", id))?;
        row.transaction.payment_status = transition.payment_status;
        row.transaction.updated_at = now;
        if let Some(paid_at) = transition.paid_at {
            row.payment_detail.get_or_insert_with(Default::default).paid_at = Some(paid_at);
        }
        let transaction = row.transaction.clone();

        for order in tables.orders.values_mut() {
            if order.transaction_id == id {
                order.order_status = transition.order_status;
                order.updated_at = now;
            }
        }

        let ticket = if transition.issue_ticket
            && let Some(order_id) = primary_order
        {
            let ticket_number =
                next_ticket_number(tables.e_tickets.values().map(|t| t.ticket_number).max());
            let ticket = ETicket {
                id: ETicketId::new(),
                user_id: transaction.user_id,
                order_id,
                ticket_number,
                created_at: now,
                updated_at: now,
            };
            tables.e_tickets.insert(ticket.id, ticket.clone());
            Some(ticket)
        } else {
            None
        };

        Ok(PaymentUpdateOutcome {
            transaction,
            orders: tables.orders_of(id),
            ticket,
            transition: Some(transition),
        })
    }

    async fn get_e_ticket(&self, id: ETicketId) -> Result<Option<ETicket>> {
        Ok(self.tables.read().await.e_tickets.get(&id).cloned())
    }

    async fn list_e_tickets(
        &self,
        filter: &TicketFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<ETicket>> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<ETicket> = tables
            .e_tickets
            .values()
            .filter(|t| filter.user_id.is_none_or(|id| t.user_id == id))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| {
            let ordering = match sort.field {
                "updatedAt" => a.updated_at.cmp(&b.updated_at),
                "ticketNumber" => a.ticket_number.cmp(&b.ticket_number),
                _ => a
                    .created_at
                    .cmp(&b.created_at)
                    .then(a.ticket_number.cmp(&b.ticket_number)),
            };
            directed(ordering, sort.direction)
        });
        Ok(Page::from_slice(tickets, page))
    }

    async fn delete_e_ticket(&self, id: ETicketId) -> Result<bool> {
        Ok(self.tables.write().await.e_tickets.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::{GatewayStatus, PaymentMethodType, PaymentReusability, PaymentStatus, Role};

    use super::*;

    struct Fixture {
        store: InMemoryStore,
        user: User,
        method: PaymentMethod,
        workshop: Workshop,
        car: UserCar,
        service: CarService,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let user = User {
            id: UserId::new(),
            username: "budi".to_string(),
            email: "budi@example.com".to_string(),
            phone_number: Some("+6281234567890".to_string()),
            role: Role::User,
            created_at: Utc::now(),
        };
        let workshop = Workshop {
            id: WorkshopId::new(),
            name: "Bengkel Maju".to_string(),
            address: "Jl. Sudirman 1".to_string(),
        };
        let car = UserCar {
            id: UserCarId::new(),
            user_id: user.id,
            plate_number: "B 1234 XYZ".to_string(),
        };
        let service = CarService {
            id: CarServiceId::new(),
            name: "Full body repaint".to_string(),
            price: Money::from_rupiah(150_000),
        };
        store.insert_user(user.clone()).await;
        store.insert_workshop(workshop.clone()).await;
        store.insert_user_car(car.clone()).await;
        store.insert_car_service(service.clone()).await;
        let method = store
            .create_payment_method(PaymentMethodDraft {
                name: "QRIS".to_string(),
                method_type: PaymentMethodType::QrCode,
                reusability: PaymentReusability::OneTimeUse,
                fee: Money::from_rupiah(1_000),
                description: None,
                logo_url: None,
                is_active: true,
                e_wallet_payment_config: None,
                virtual_account_config: None,
            })
            .await
            .unwrap();
        Fixture {
            store,
            user,
            method,
            workshop,
            car,
            service,
        }
    }

    async fn checkout(f: &Fixture) -> TransactionDetails {
        let now = Utc::now();
        let transaction = Transaction {
            id: TransactionId::new(),
            user_id: f.user.id,
            payment_method_id: f.method.id,
            admin_fee: Money::zero(),
            total_price: Money::from_rupiah(151_000),
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let order = Order {
            id: OrderId::new(),
            user_id: f.user.id,
            user_car_id: f.car.id,
            workshop_id: f.workshop.id,
            transaction_id: transaction.id,
            note: None,
            subtotal_price: f.service.price,
            order_status: OrderStatus::Draft,
            work_status: WorkStatus::Queued,
            car_service_ids: vec![f.service.id],
            created_at: now,
            updated_at: now,
        };
        f.store
            .create_checkout(NewCheckout {
                transaction,
                order,
                payment_detail: PaymentDetail {
                    xendit_invoice_id: Some("inv-1".to_string()),
                    ..Default::default()
                },
            })
            .await
            .unwrap()
    }

    fn paid() -> GatewayEvent {
        GatewayEvent {
            reference: String::new(),
            status: GatewayStatus::Paid,
            paid_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_checkout_returns_details() {
        let f = fixture().await;
        let details = checkout(&f).await;
        assert_eq!(details.orders.len(), 1);
        assert_eq!(details.payment_method.as_ref().unwrap().id, f.method.id);
        assert_eq!(
            details.payment_detail.unwrap().xendit_invoice_id.as_deref(),
            Some("inv-1")
        );
    }

    #[tokio::test]
    async fn test_create_checkout_checks_references() {
        let f = fixture().await;
        let mut details = checkout(&f).await;
        let mut order = details.orders.remove(0);
        order.id = OrderId::new();
        order.workshop_id = WorkshopId::new();
        let mut transaction = details.transaction;
        transaction.id = TransactionId::new();
        order.transaction_id = transaction.id;

        let err = f
            .store
            .create_checkout(NewCheckout {
                transaction,
                order,
                payment_detail: PaymentDetail::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(ref c) if c == "orders_workshop_id_fkey"));
    }

    #[tokio::test]
    async fn test_paid_update_issues_sequential_tickets() {
        let f = fixture().await;
        let first = checkout(&f).await;
        let second = checkout(&f).await;

        let outcome = f
            .store
            .apply_payment_update(first.transaction.id, &paid())
            .await
            .unwrap();
        assert_eq!(outcome.transaction.payment_status, PaymentStatus::Success);
        assert_eq!(outcome.ticket.as_ref().unwrap().ticket_number, 1);

        let outcome = f
            .store
            .apply_payment_update(second.transaction.id, &paid())
            .await
            .unwrap();
        assert_eq!(outcome.ticket.unwrap().ticket_number, 2);
    }

    #[tokio::test]
    async fn test_redelivered_paid_update_is_idempotent() {
        let f = fixture().await;
        let details = checkout(&f).await;
        let id = details.transaction.id;

        f.store.apply_payment_update(id, &paid()).await.unwrap();
        let again = f.store.apply_payment_update(id, &paid()).await.unwrap();
        assert!(again.ticket.is_none());
        assert_eq!(f.store.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_never_duplicate_ticket_numbers() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for _ in 0..20 {
            ids.push(checkout(&f).await.transaction.id);
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let store = f.store.clone();
                tokio::spawn(async move { store.apply_payment_update(id, &paid()).await })
            })
            .collect();
        let mut numbers = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            numbers.push(outcome.ticket.unwrap().ticket_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=20).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let f = fixture().await;
        let err = f
            .store
            .apply_payment_update(TransactionId::new(), &paid())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "Transaction", .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_ignored_status_changes_nothing() {
        let f = fixture().await;
        let details = checkout(&f).await;
        let event = GatewayEvent {
            reference: String::new(),
            status: GatewayStatus::from("SETTLED"),
            paid_at: None,
        };
        let outcome = f
            .store
            .apply_payment_update(details.transaction.id, &event)
            .await
            .unwrap();
        assert!(outcome.transition.is_none());
        assert_eq!(outcome.transaction.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let f = fixture().await;
        let details = checkout(&f).await;
        f.store.fail_next_payment_updates(2);

        for _ in 0..2 {
            let err = f
                .store
                .apply_payment_update(details.transaction.id, &paid())
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        assert!(
            f.store
                .apply_payment_update(details.transaction.id, &paid())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_cancel_order_records_cancellation_and_refund() {
        let f = fixture().await;
        let details = checkout(&f).await;
        let order = f
            .store
            .cancel_order(OrderCancellation {
                order_id: details.orders[0].id,
                transaction_id: details.transaction.id,
                expected_payment_status: PaymentStatus::Pending,
                payment_status: Some(PaymentStatus::Refunded),
                cancellation: Some(Cancellation {
                    reason: domain::CancellationReason::CustomerRequest,
                    notes: None,
                    cancelled_by_id: f.user.id,
                    cancelled_at: Utc::now(),
                }),
                refund: Some(Refund {
                    amount: details.transaction.total_price,
                    reason: String::new(),
                    refunded_by_id: f.user.id,
                    refunded_at: Utc::now(),
                }),
            })
            .await
            .unwrap();
        assert_eq!(order.order_status, OrderStatus::Cancelled);
        assert_eq!(order.work_status, WorkStatus::Cancelled);

        let reloaded = f
            .store
            .get_transaction(details.transaction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.transaction.payment_status, PaymentStatus::Refunded);
        assert!(reloaded.cancellation.is_some());
        assert!(reloaded.refund.is_some());
    }

    #[tokio::test]
    async fn test_cancel_order_rejects_stale_payment_status() {
        let f = fixture().await;
        let details = checkout(&f).await;
        f.store
            .apply_payment_update(details.transaction.id, &paid())
            .await
            .unwrap();

        let err = f
            .store
            .cancel_order(OrderCancellation {
                order_id: details.orders[0].id,
                transaction_id: details.transaction.id,
                expected_payment_status: PaymentStatus::Pending,
                payment_status: Some(PaymentStatus::Failed),
                cancellation: None,
                refund: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(err.is_transient());

        let reloaded = f
            .store
            .get_transaction(details.transaction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.transaction.payment_status, PaymentStatus::Success);
        assert_eq!(reloaded.orders[0].order_status, OrderStatus::Draft);
    }

    #[tokio::test]
    async fn test_payment_method_names_are_unique() {
        let f = fixture().await;
        let draft = PaymentMethodDraft {
            name: f.method.name.clone(),
            method_type: PaymentMethodType::QrCode,
            reusability: PaymentReusability::OneTimeUse,
            fee: Money::zero(),
            description: None,
            logo_url: None,
            is_active: true,
            e_wallet_payment_config: None,
            virtual_account_config: None,
        };
        let err = f.store.create_payment_method(draft).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_payment_method_in_use_cannot_be_deleted() {
        let f = fixture().await;
        checkout(&f).await;
        let err = f.store.delete_payment_method(f.method.id).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let f = fixture().await;
        for _ in 0..3 {
            checkout(&f).await;
        }
        let page = f
            .store
            .list_orders(
                &OrderFilter::for_user(f.user.id),
                &PageRequest { page: 1, limit: 2 },
                &Sort::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].created_at >= page.items[1].created_at);

        let none = f
            .store
            .list_transactions(
                &TransactionFilter::new().payment_method_name(Some("ovo".to_string())),
                &PageRequest::default(),
                &Sort::default(),
            )
            .await
            .unwrap();
        assert_eq!(none.total, 0);

        let qris = f
            .store
            .list_transactions(
                &TransactionFilter::new().payment_method_name(Some("qris".to_string())),
                &PageRequest::default(),
                &Sort::default(),
            )
            .await
            .unwrap();
        assert_eq!(qris.total, 3);
    }

    #[tokio::test]
    async fn test_delete_transaction_cascades() {
        let f = fixture().await;
        let details = checkout(&f).await;
        f.store
            .apply_payment_update(details.transaction.id, &paid())
            .await
            .unwrap();

        assert!(f.store.delete_transaction(details.transaction.id).await.unwrap());
        assert!(f.store.get_order(details.orders[0].id).await.unwrap().is_none());
        assert_eq!(f.store.ticket_count().await, 0);
    }
}
