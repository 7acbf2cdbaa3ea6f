//! Order histories: a compact view of a transaction and its order.

use std::sync::Arc;

use axum::Extension;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{CarServiceId, ETicketId, Money, OrderId, PaymentMethodId, TransactionId, WorkshopId};
use domain::{OrderStatus, PaymentStatus, TransactionDetails, WorkStatus};
use serde::Serialize;
use store::{Store, TRANSACTION_SORT_FIELDS, TransactionFilter};

use super::transactions::TransactionListQuery;
use super::{can_see, load_caller, parse_id};
use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub id: TransactionId,
    pub payment_status: PaymentStatus,
    pub admin_fee: Money,
    pub total_price: Money,
    pub payment_method: Option<MethodSummary>,
    pub order: Option<OrderSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSummary {
    pub id: PaymentMethodId,
    pub name: String,
    pub fee: Money,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderId,
    pub note: Option<String>,
    pub order_status: OrderStatus,
    pub work_status: WorkStatus,
    pub subtotal_price: Money,
    pub workshop_id: WorkshopId,
    pub car_service_ids: Vec<CarServiceId>,
    pub e_tickets: Vec<TicketSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    pub id: ETicketId,
    pub ticket_number: i64,
}

impl From<TransactionDetails> for History {
    fn from(details: TransactionDetails) -> Self {
        let tickets = &details.e_tickets;
        let order = details.orders.into_iter().next().map(|order| OrderSummary {
            e_tickets: tickets
                .iter()
                .filter(|t| t.order_id == order.id)
                .map(|t| TicketSummary {
                    id: t.id,
                    ticket_number: t.ticket_number,
                })
                .collect(),
            id: order.id,
            note: order.note,
            order_status: order.order_status,
            work_status: order.work_status,
            subtotal_price: order.subtotal_price,
            workshop_id: order.workshop_id,
            car_service_ids: order.car_service_ids,
        });

        let tx = details.transaction;
        Self {
            id: tx.id,
            payment_status: tx.payment_status,
            admin_fee: tx.admin_fee,
            total_price: tx.total_price,
            payment_method: details.payment_method.map(|m| MethodSummary {
                id: m.id,
                name: m.name,
                fee: m.fee,
            }),
            order,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// GET /histories (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Query(query): Query<TransactionListQuery>,
) -> Result<ApiResponse<Vec<History>>, ApiError> {
    let filter = query.apply(TransactionFilter::new())?;
    let page = query.list.page();
    let transactions = state
        .store
        .list_transactions(&filter, &page, &query.list.sort(TRANSACTION_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(transactions.map(History::from), &page))
}

/// GET /histories/user
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<TransactionListQuery>,
) -> Result<ApiResponse<Vec<History>>, ApiError> {
    let filter = query.apply(TransactionFilter::for_user(auth.id))?;
    let page = query.list.page();
    let transactions = state
        .store
        .list_transactions(&filter, &page, &query.list.sort(TRANSACTION_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(transactions.map(History::from), &page))
}

/// GET /histories/{id}: `id` is the transaction id.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<ApiResponse<History>, ApiError> {
    let caller = load_caller(&state.store, auth).await?;
    let details = state
        .store
        .get_transaction(parse_id(&id, "History")?)
        .await?
        .filter(|d| can_see(&caller, d.transaction.user_id))
        .ok_or_else(|| ApiError::not_found("History"))?;
    Ok(ApiResponse::ok(History::from(details)))
}
