use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use common::{
    CarServiceId, ETicketId, Money, OrderId, Page, PageRequest, PaymentMethodId, Sort,
    TransactionId, UserCarId, UserId, WorkshopId,
};
use domain::{
    Cancellation, CarService, ETicket, EWalletConfig, GatewayEvent, Order, OrderStatus,
    PaymentDetail, PaymentMethod, PaymentMethodDraft, PaymentSnapshot, PaymentStatus, Refund,
    Transaction, TransactionDetails, UnknownVariant, User, VirtualAccountConfig, WorkStatus,
    next_ticket_number, resolve_transition,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::query::{OrderFilter, TicketFilter, TransactionFilter};
use crate::store::{NewCheckout, OrderCancellation, PaymentUpdateOutcome, Store};
use crate::{Result, StoreError};

const PAYMENT_METHOD_SELECT: &str = r#"
    SELECT pm.id, pm.name, pm.type, pm.reusability, pm.fee, pm.description, pm.logo_url,
           pm.is_active, pm.created_at, pm.updated_at,
           ew.channel_code AS ew_channel_code,
           ew.success_return_url AS ew_success_return_url,
           ew.failure_return_url AS ew_failure_return_url,
           va.bank_code AS va_bank_code,
           va.bank_name AS va_bank_name,
           va.account_pattern AS va_account_pattern
    FROM payment_methods pm
    LEFT JOIN ewallet_payment_configs ew ON ew.payment_method_id = pm.id
    LEFT JOIN virtual_account_configs va ON va.payment_method_id = pm.id
"#;

const ORDER_COLUMNS: &str = r#"
    o.id, o.user_id, o.user_car_id, o.workshop_id, o.transaction_id, o.note, o.subtotal_price,
    o.order_status, o.work_status, o.created_at, o.updated_at,
    ARRAY(
        SELECT ocs.car_service_id FROM order_car_services ocs
        WHERE ocs.order_id = o.id ORDER BY ocs.position
    ) AS car_service_ids
"#;

const TRANSACTION_COLUMNS: &str = r#"
    t.id, t.user_id, t.payment_method_id, t.admin_fee, t.total_price, t.payment_status,
    t.created_at, t.updated_at
"#;

const TICKET_COLUMNS: &str = "e.id, e.user_id, e.order_id, e.ticket_number, e.created_at, e.updated_at";

fn parse_enum<T: FromStr<Err = UnknownVariant>>(value: String) -> Result<T> {
    value
        .parse()
        .map_err(|e: UnknownVariant| StoreError::Decode(e.to_string()))
}

/// Builds an ORDER BY clause from an allow-listed sort field.
fn order_by(sort: &Sort, alias: &str) -> String {
    let column = match sort.field {
        "updatedAt" => "updated_at",
        "name" => "name",
        "fee" => "fee",
        "totalPrice" => "total_price",
        "ticketNumber" => "ticket_number",
        _ => "created_at",
    };
    let direction = sort.direction.as_sql();
    format!(" ORDER BY {alias}.{column} {direction}, {alias}.id {direction}")
}

fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: &PageRequest) {
    builder
        .push(" LIMIT ")
        .push_bind(page.limit as i64)
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

fn push_order_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    if let Some(id) = filter.user_id {
        builder.push(" AND o.user_id = ").push_bind(id.as_uuid());
    }
    if let Some(id) = filter.workshop_id {
        builder.push(" AND o.workshop_id = ").push_bind(id.as_uuid());
    }
    if let Some(status) = filter.order_status {
        builder.push(" AND o.order_status = ").push_bind(status.as_str());
    }
    if let Some(status) = filter.work_status {
        builder.push(" AND o.work_status = ").push_bind(status.as_str());
    }
}

fn push_transaction_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    if let Some(id) = filter.user_id {
        builder.push(" AND t.user_id = ").push_bind(id.as_uuid());
    }
    if let Some(status) = filter.payment_status {
        builder.push(" AND t.payment_status = ").push_bind(status.as_str());
    }
    if let Some(name) = &filter.payment_method_name {
        builder
            .push(" AND LOWER(pm.name) = LOWER(")
            .push_bind(name.clone())
            .push(")");
    }
}

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        Ok(User {
            id: UserId::from_uuid(row.try_get("id")?),
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            phone_number: row.try_get("phone_number")?,
            role: parse_enum(row.try_get("role")?)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_payment_method(row: &PgRow) -> Result<PaymentMethod> {
        let e_wallet_payment_config = match row.try_get::<Option<String>, _>("ew_channel_code")? {
            Some(channel_code) => Some(EWalletConfig {
                channel_code,
                success_return_url: row.try_get("ew_success_return_url")?,
                failure_return_url: row.try_get("ew_failure_return_url")?,
            }),
            None => None,
        };
        let virtual_account_config = match row.try_get::<Option<String>, _>("va_bank_code")? {
            Some(bank_code) => Some(VirtualAccountConfig {
                bank_code,
                bank_name: row.try_get("va_bank_name")?,
                account_pattern: row.try_get("va_account_pattern")?,
            }),
            None => None,
        };

        Ok(PaymentMethod {
            id: PaymentMethodId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            method_type: parse_enum(row.try_get("type")?)?,
            reusability: parse_enum(row.try_get("reusability")?)?,
            fee: Money::from_rupiah(row.try_get("fee")?),
            description: row.try_get("description")?,
            logo_url: row.try_get("logo_url")?,
            is_active: row.try_get("is_active")?,
            e_wallet_payment_config,
            virtual_account_config,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            payment_method_id: PaymentMethodId::from_uuid(row.try_get("payment_method_id")?),
            admin_fee: Money::from_rupiah(row.try_get("admin_fee")?),
            total_price: Money::from_rupiah(row.try_get("total_price")?),
            payment_status: parse_enum(row.try_get("payment_status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let car_service_ids: Vec<Uuid> = row.try_get("car_service_ids")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            user_car_id: UserCarId::from_uuid(row.try_get("user_car_id")?),
            workshop_id: WorkshopId::from_uuid(row.try_get("workshop_id")?),
            transaction_id: TransactionId::from_uuid(row.try_get("transaction_id")?),
            note: row.try_get("note")?,
            subtotal_price: Money::from_rupiah(row.try_get("subtotal_price")?),
            order_status: parse_enum(row.try_get("order_status")?)?,
            work_status: parse_enum(row.try_get("work_status")?)?,
            car_service_ids: car_service_ids
                .into_iter()
                .map(CarServiceId::from_uuid)
                .collect(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_ticket(row: &PgRow) -> Result<ETicket> {
        Ok(ETicket {
            id: ETicketId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            ticket_number: row.try_get("ticket_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_payment_detail(row: &PgRow) -> Result<PaymentDetail> {
        Ok(PaymentDetail {
            xendit_invoice_id: row.try_get("xendit_invoice_id")?,
            xendit_payment_request_id: row.try_get("xendit_payment_request_id")?,
            xendit_payment_method_id: row.try_get("xendit_payment_method_id")?,
            web_url: row.try_get("web_url")?,
            mobile_url: row.try_get("mobile_url")?,
            deeplink_url: row.try_get("deeplink_url")?,
            virtual_account_number: row.try_get("virtual_account_number")?,
            paid_at: row.try_get("paid_at")?,
        })
    }

    async fn fetch_order(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn fetch_orders_of(conn: &mut PgConnection, id: TransactionId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.transaction_id = $1 ORDER BY o.created_at ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(Self::row_to_order).collect()
    }

    async fn fetch_transaction(
        conn: &mut PgConnection,
        id: TransactionId,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn write_method_configs(
        conn: &mut PgConnection,
        id: PaymentMethodId,
        draft: &PaymentMethodDraft,
    ) -> Result<()> {
        if let Some(config) = &draft.e_wallet_payment_config {
            sqlx::query(
                r#"
                INSERT INTO ewallet_payment_configs
                    (payment_method_id, channel_code, success_return_url, failure_return_url)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id.as_uuid())
            .bind(&config.channel_code)
            .bind(&config.success_return_url)
            .bind(&config.failure_return_url)
            .execute(&mut *conn)
            .await?;
        }
        if let Some(config) = &draft.virtual_account_config {
            sqlx::query(
                r#"
                INSERT INTO virtual_account_configs
                    (payment_method_id, bank_code, bank_name, account_pattern)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id.as_uuid())
            .bind(&config.bank_code)
            .bind(&config.bank_name)
            .bind(&config.account_pattern)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Loads everything hanging off a batch of transactions, keeping their order.
    async fn load_details(&self, transactions: Vec<Transaction>) -> Result<Vec<TransactionDetails>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = transactions.iter().map(|t| t.id.as_uuid()).collect();
        let method_ids: Vec<Uuid> = transactions
            .iter()
            .map(|t| t.payment_method_id.as_uuid())
            .collect();

        let mut methods = HashMap::new();
        for row in sqlx::query(&format!("{PAYMENT_METHOD_SELECT} WHERE pm.id = ANY($1)"))
            .bind(&method_ids)
            .fetch_all(&self.pool)
            .await?
        {
            let method = Self::row_to_payment_method(&row)?;
            methods.insert(method.id, method);
        }

        let mut payment_details = HashMap::new();
        for row in sqlx::query("SELECT * FROM payment_details WHERE transaction_id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
        {
            let id = TransactionId::from_uuid(row.try_get("transaction_id")?);
            payment_details.insert(id, Self::row_to_payment_detail(&row)?);
        }

        let mut cancellations = HashMap::new();
        for row in sqlx::query(
            r#"
            SELECT transaction_id, reason, notes, cancelled_by_id, cancelled_at
            FROM cancellations WHERE transaction_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        {
            let id = TransactionId::from_uuid(row.try_get("transaction_id")?);
            cancellations.insert(
                id,
                Cancellation {
                    reason: parse_enum(row.try_get("reason")?)?,
                    notes: row.try_get("notes")?,
                    cancelled_by_id: UserId::from_uuid(row.try_get("cancelled_by_id")?),
                    cancelled_at: row.try_get("cancelled_at")?,
                },
            );
        }

        let mut refunds = HashMap::new();
        for row in sqlx::query(
            r#"
            SELECT transaction_id, amount, reason, refunded_by_id, refunded_at
            FROM refunds WHERE transaction_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        {
            let id = TransactionId::from_uuid(row.try_get("transaction_id")?);
            refunds.insert(
                id,
                Refund {
                    amount: Money::from_rupiah(row.try_get("amount")?),
                    reason: row.try_get("reason")?,
                    refunded_by_id: UserId::from_uuid(row.try_get("refunded_by_id")?),
                    refunded_at: row.try_get("refunded_at")?,
                },
            );
        }

        let mut orders: HashMap<TransactionId, Vec<Order>> = HashMap::new();
        for row in sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.transaction_id = ANY($1) ORDER BY o.created_at ASC"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        {
            let order = Self::row_to_order(&row)?;
            orders.entry(order.transaction_id).or_default().push(order);
        }

        let mut tickets: HashMap<TransactionId, Vec<ETicket>> = HashMap::new();
        for row in sqlx::query(&format!(
            r#"
            SELECT {TICKET_COLUMNS}, o.transaction_id
            FROM e_tickets e JOIN orders o ON o.id = e.order_id
            WHERE o.transaction_id = ANY($1)
            ORDER BY e.ticket_number ASC
            "#
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        {
            let id = TransactionId::from_uuid(row.try_get("transaction_id")?);
            tickets.entry(id).or_default().push(Self::row_to_ticket(&row)?);
        }

        Ok(transactions
            .into_iter()
            .map(|transaction| {
                let id = transaction.id;
                TransactionDetails {
                    payment_method: methods.get(&transaction.payment_method_id).cloned(),
                    payment_detail: payment_details.remove(&id),
                    cancellation: cancellations.remove(&id),
                    refund: refunds.remove(&id),
                    orders: orders.remove(&id).unwrap_or_default(),
                    e_tickets: tickets.remove(&id).unwrap_or_default(),
                    transaction,
                }
            })
            .collect())
    }

    async fn apply_payment_update_serializable(
        &self,
        id: TransactionId,
        event: &GatewayEvent,
    ) -> Result<PaymentUpdateOutcome> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT t.payment_status,
                   EXISTS(SELECT 1 FROM cancellations c WHERE c.transaction_id = t.id) AS has_cancellation,
                   EXISTS(SELECT 1 FROM refunds r WHERE r.transaction_id = t.id) AS has_refund
            FROM transactions t
            WHERE t.id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("Transaction", id))?;

        let orders = Self::fetch_orders_of(&mut tx, id).await?;
        let primary_order = orders.first().map(|o| o.id);
        let ticket_issued = match primary_order {
            Some(order_id) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM e_tickets WHERE order_id = $1)",
                )
                .bind(order_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?
            }
            None => false,
        };
        let snapshot = PaymentSnapshot {
            payment_status: parse_enum(row.try_get("payment_status")?)?,
            has_cancellation: row.try_get("has_cancellation")?,
            has_refund: row.try_get("has_refund")?,
            ticket_issued,
        };

        let Some(transition) = resolve_transition(event, &snapshot) else {
            let transaction = Self::fetch_transaction(&mut tx, id)
                .await?
                .ok_or_else(|| StoreError::not_found("Transaction", id))?;
            tx.commit().await?;
            return Ok(PaymentUpdateOutcome {
                transaction,
                orders,
                ticket: None,
                transition: None,
            });
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions t SET payment_status = $2, updated_at = NOW()
            WHERE t.id = $1
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(transition.payment_status.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let transaction = Self::row_to_transaction(&row)?;

        sqlx::query("UPDATE orders SET order_status = $2, updated_at = NOW() WHERE transaction_id = $1")
            .bind(id.as_uuid())
            .bind(transition.order_status.as_str())
            .execute(&mut *tx)
            .await?;

        if let Some(paid_at) = transition.paid_at {
            sqlx::query(
                r#"
                INSERT INTO payment_details (transaction_id, paid_at) VALUES ($1, $2)
                ON CONFLICT (transaction_id) DO UPDATE SET paid_at = EXCLUDED.paid_at
                "#,
            )
            .bind(id.as_uuid())
            .bind(paid_at)
            .execute(&mut *tx)
            .await?;
        }

        let ticket = if transition.issue_ticket
            && let Some(order_id) = primary_order
        {
            let current_max: Option<i64> =
                sqlx::query_scalar("SELECT MAX(ticket_number) FROM e_tickets")
                    .fetch_one(&mut *tx)
                    .await?;
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO e_tickets AS e (id, user_id, order_id, ticket_number)
                VALUES ($1, $2, $3, $4)
                RETURNING {TICKET_COLUMNS}
                "#
            ))
            .bind(ETicketId::new().as_uuid())
            .bind(transaction.user_id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(next_ticket_number(current_max))
            .fetch_one(&mut *tx)
            .await?;
            Some(Self::row_to_ticket(&row)?)
        } else {
            None
        };

        let orders = Self::fetch_orders_of(&mut tx, id).await?;
        tx.commit().await?;

        Ok(PaymentUpdateOutcome {
            transaction,
            orders,
            ticket,
            transition: Some(transition),
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, phone_number, role, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_car_services(&self, ids: &[CarServiceId]) -> Result<Vec<CarService>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id, name, price FROM car_services WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(CarService {
                    id: CarServiceId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    price: Money::from_rupiah(row.try_get("price")?),
                })
            })
            .collect()
    }

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query(&format!("{PAYMENT_METHOD_SELECT} WHERE pm.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_payment_method).transpose()
    }

    async fn list_payment_methods(
        &self,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<PaymentMethod>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_methods")
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(PAYMENT_METHOD_SELECT);
        query.push(order_by(sort, "pm"));
        push_page(&mut query, page);
        let rows = query.build().fetch_all(&self.pool).await?;

        let methods = rows
            .iter()
            .map(Self::row_to_payment_method)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(methods, total as u64))
    }

    async fn create_payment_method(&self, draft: PaymentMethodDraft) -> Result<PaymentMethod> {
        let id = PaymentMethodId::new();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO payment_methods
                (id, name, type, reusability, fee, description, logo_url, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&draft.name)
        .bind(draft.method_type.as_str())
        .bind(draft.reusability.as_str())
        .bind(draft.fee.rupiah())
        .bind(&draft.description)
        .bind(&draft.logo_url)
        .bind(draft.is_active)
        .execute(&mut *tx)
        .await?;
        Self::write_method_configs(&mut tx, id, &draft).await?;
        tx.commit().await?;

        self.get_payment_method(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Payment method", id))
    }

    async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        draft: PaymentMethodDraft,
    ) -> Result<Option<PaymentMethod>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE payment_methods
            SET name = $2, type = $3, reusability = $4, fee = $5, description = $6,
                logo_url = $7, is_active = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&draft.name)
        .bind(draft.method_type.as_str())
        .bind(draft.reusability.as_str())
        .bind(draft.fee.rupiah())
        .bind(&draft.description)
        .bind(&draft.logo_url)
        .bind(draft.is_active)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM ewallet_payment_configs WHERE payment_method_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM virtual_account_configs WHERE payment_method_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::write_method_configs(&mut tx, id, &draft).await?;
        tx.commit().await?;

        self.get_payment_method(id).await
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM payment_methods WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_checkout(&self, checkout: NewCheckout) -> Result<TransactionDetails> {
        let NewCheckout {
            transaction,
            order,
            payment_detail,
        } = checkout;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, user_id, payment_method_id, admin_fee, total_price, payment_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.user_id.as_uuid())
        .bind(transaction.payment_method_id.as_uuid())
        .bind(transaction.admin_fee.rupiah())
        .bind(transaction.total_price.rupiah())
        .bind(transaction.payment_status.as_str())
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, user_car_id, workshop_id, transaction_id, note, subtotal_price,
                 order_status, work_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.user_car_id.as_uuid())
        .bind(order.workshop_id.as_uuid())
        .bind(order.transaction_id.as_uuid())
        .bind(&order.note)
        .bind(order.subtotal_price.rupiah())
        .bind(order.order_status.as_str())
        .bind(order.work_status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        let service_ids: Vec<Uuid> = order.car_service_ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO order_car_services (order_id, car_service_id, position)
            SELECT $1, s.id, s.position::INT
            FROM UNNEST($2::UUID[]) WITH ORDINALITY AS s(id, position)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&service_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payment_details
                (transaction_id, xendit_invoice_id, xendit_payment_request_id,
                 xendit_payment_method_id, web_url, mobile_url, deeplink_url,
                 virtual_account_number, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(&payment_detail.xendit_invoice_id)
        .bind(&payment_detail.xendit_payment_request_id)
        .bind(&payment_detail.xendit_payment_method_id)
        .bind(&payment_detail.web_url)
        .bind(&payment_detail.mobile_url)
        .bind(&payment_detail.deeplink_url)
        .bind(&payment_detail.virtual_account_number)
        .bind(payment_detail.paid_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(transaction_id = %transaction.id, order_id = %order.id, "checkout persisted");

        self.get_transaction(transaction.id)
            .await?
            .ok_or_else(|| StoreError::not_found("Transaction", transaction.id))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_order(&mut conn, id).await
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<Order>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders o WHERE TRUE");
        push_order_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE TRUE"
        ));
        push_order_filters(&mut query, filter);
        query.push(order_by(sort, "o"));
        push_page(&mut query, page);
        let rows = query.build().fetch_all(&self.pool).await?;

        let orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(orders, total as u64))
    }

    async fn update_order(&self, order: &Order) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE orders SET note = $2, order_status = $3, work_status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.note)
        .bind(order.order_status.as_str())
        .bind(order.work_status.as_str())
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::fetch_order(&mut conn, order.id).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = Self::fetch_order(&mut tx, id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn cancel_order(&self, cancellation: OrderCancellation) -> Result<Order> {
        let OrderCancellation {
            order_id,
            transaction_id,
            expected_payment_status,
            payment_status,
            cancellation,
            refund,
        } = cancellation;
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let current: PaymentStatus = parse_enum(
            sqlx::query_scalar::<_, String>(
                "SELECT payment_status FROM transactions WHERE id = $1 FOR UPDATE",
            )
            .bind(transaction_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("Transaction", transaction_id))?,
        )?;
        if current != expected_payment_status {
            return Err(StoreError::payment_status_changed(
                expected_payment_status,
                current,
            ));
        }

        let updated = sqlx::query(
            r#"
            UPDATE orders SET order_status = $2, work_status = $3, updated_at = NOW()
            WHERE id = $1 AND transaction_id = $4
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(OrderStatus::Cancelled.as_str())
        .bind(WorkStatus::Cancelled.as_str())
        .bind(transaction_id.as_uuid())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", order_id));
        }

        if let Some(status) = payment_status {
            sqlx::query(
                "UPDATE transactions SET payment_status = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(transaction_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        if let Some(cancellation) = cancellation {
            sqlx::query(
                r#"
                INSERT INTO cancellations (transaction_id, reason, notes, cancelled_by_id, cancelled_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (transaction_id) DO UPDATE
                SET reason = EXCLUDED.reason, notes = EXCLUDED.notes,
                    cancelled_by_id = EXCLUDED.cancelled_by_id, cancelled_at = EXCLUDED.cancelled_at
                "#,
            )
            .bind(transaction_id.as_uuid())
            .bind(cancellation.reason.as_str())
            .bind(&cancellation.notes)
            .bind(cancellation.cancelled_by_id.as_uuid())
            .bind(cancellation.cancelled_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(refund) = refund {
            sqlx::query(
                r#"
                INSERT INTO refunds (transaction_id, amount, reason, refunded_by_id, refunded_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (transaction_id) DO UPDATE
                SET amount = EXCLUDED.amount, reason = EXCLUDED.reason,
                    refunded_by_id = EXCLUDED.refunded_by_id, refunded_at = EXCLUDED.refunded_at
                "#,
            )
            .bind(transaction_id.as_uuid())
            .bind(refund.amount.rupiah())
            .bind(&refund.reason)
            .bind(refund.refunded_by_id.as_uuid())
            .bind(refund.refunded_at)
            .execute(&mut *tx)
            .await?;
        }

        let order = Self::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;
        tx.commit().await?;
        Ok(order)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<TransactionDetails>> {
        let mut conn = self.pool.acquire().await?;
        let Some(transaction) = Self::fetch_transaction(&mut conn, id).await? else {
            return Ok(None);
        };
        drop(conn);
        Ok(self.load_details(vec![transaction]).await?.pop())
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<TransactionDetails>> {
        const FROM: &str =
            " FROM transactions t JOIN payment_methods pm ON pm.id = t.payment_method_id WHERE TRUE";

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*){FROM}"));
        push_transaction_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {TRANSACTION_COLUMNS}{FROM}"));
        push_transaction_filters(&mut query, filter);
        query.push(order_by(sort, "t"));
        push_page(&mut query, page);
        let rows = query.build().fetch_all(&self.pool).await?;

        let transactions = rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(self.load_details(transactions).await?, total as u64))
    }

    async fn delete_transaction(&self, id: TransactionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_payment_update(
        &self,
        id: TransactionId,
        event: &GatewayEvent,
    ) -> Result<PaymentUpdateOutcome> {
        let result = self.apply_payment_update_serializable(id, event).await;
        if let Err(StoreError::Conflict(reason)) = &result {
            metrics::counter!("store_serialization_conflicts_total").increment(1);
            tracing::debug!(transaction_id = %id, %reason, "payment update hit a serialization conflict");
        }
        result
    }

    async fn get_e_ticket(&self, id: ETicketId) -> Result<Option<ETicket>> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM e_tickets e WHERE e.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_ticket).transpose()
    }

    async fn list_e_tickets(
        &self,
        filter: &TicketFilter,
        page: &PageRequest,
        sort: &Sort,
    ) -> Result<Page<ETicket>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM e_tickets e WHERE TRUE");
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {TICKET_COLUMNS} FROM e_tickets e WHERE TRUE"));
        if let Some(user_id) = filter.user_id {
            count.push(" AND e.user_id = ").push_bind(user_id.as_uuid());
            query.push(" AND e.user_id = ").push_bind(user_id.as_uuid());
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        query.push(order_by(sort, "e"));
        push_page(&mut query, page);
        let rows = query.build().fetch_all(&self.pool).await?;

        let tickets = rows
            .iter()
            .map(Self::row_to_ticket)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(tickets, total as u64))
    }

    async fn delete_e_ticket(&self, id: ETicketId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM e_tickets WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// Catalog rows are owned by other services; these seed them for fixtures.
impl PostgresStore {
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, phone_number, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_workshop(&self, workshop: &domain::Workshop) -> Result<()> {
        sqlx::query("INSERT INTO workshops (id, name, address) VALUES ($1, $2, $3)")
            .bind(workshop.id.as_uuid())
            .bind(&workshop.name)
            .bind(&workshop.address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_user_car(&self, car: &domain::UserCar) -> Result<()> {
        sqlx::query("INSERT INTO user_cars (id, user_id, plate_number) VALUES ($1, $2, $3)")
            .bind(car.id.as_uuid())
            .bind(car.user_id.as_uuid())
            .bind(&car.plate_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_car_service(&self, service: &CarService) -> Result<()> {
        sqlx::query("INSERT INTO car_services (id, name, price) VALUES ($1, $2, $3)")
            .bind(service.id.as_uuid())
            .bind(&service.name)
            .bind(service.price.rupiah())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::SortDirection;

    use super::*;

    #[test]
    fn test_order_by_maps_allow_listed_fields() {
        let sort = Sort {
            field: "totalPrice",
            direction: SortDirection::Asc,
        };
        assert_eq!(
            order_by(&sort, "t"),
            " ORDER BY t.total_price ASC, t.id ASC"
        );
        assert_eq!(
            order_by(&Sort::default(), "o"),
            " ORDER BY o.created_at DESC, o.id DESC"
        );
    }

    #[test]
    fn test_parse_enum_reports_corrupt_rows() {
        let err = parse_enum::<OrderStatus>("SHIPPED".to_string()).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }
}
