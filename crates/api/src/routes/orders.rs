//! Order checkout, listing, back-office edits and cancellation.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use common::{OrderId, WorkshopId};
use domain::{CancelOrder, CreateOrder, Order, OrderStatus, TransactionDetails, UpdateOrder, WorkStatus};
use payments::PaymentFlow;
use serde::Deserialize;
use store::{ORDER_SORT_FIELDS, OrderFilter, Store};

use super::{ListQuery, can_see, load_caller, optional_json, parse_filter, parse_id};
use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub list: ListQuery,
    pub order_status: Option<String>,
    pub work_status: Option<String>,
}

impl OrderListQuery {
    fn apply(&self, filter: OrderFilter) -> Result<OrderFilter, ApiError> {
        Ok(filter
            .order_status(parse_filter::<OrderStatus>(
                "orderStatus",
                self.order_status.as_deref(),
            )?)
            .work_status(parse_filter::<WorkStatus>(
                "workStatus",
                self.work_status.as_deref(),
            )?))
    }
}

async fn checkout<S: Store + Clone + 'static>(
    state: &AppState<S>,
    auth: AuthUser,
    body: Result<Json<CreateOrder>, JsonRejection>,
    flow: PaymentFlow,
) -> Result<ApiResponse<TransactionDetails>, ApiError> {
    let Json(request) = body?;
    let order = request.validate()?;
    let details = state.checkout.create_order(auth.id, order, flow).await?;
    Ok(ApiResponse::created("Order created successfully", details))
}

/// POST /orders: checkout through a hosted invoice.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<CreateOrder>, JsonRejection>,
) -> Result<ApiResponse<TransactionDetails>, ApiError> {
    checkout(&state, auth, body, PaymentFlow::Invoice).await
}

/// POST /orders/payment-request: checkout by charging the channel directly.
#[tracing::instrument(skip(state, body))]
pub async fn create_with_payment_request<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<CreateOrder>, JsonRejection>,
) -> Result<ApiResponse<TransactionDetails>, ApiError> {
    checkout(&state, auth, body, PaymentFlow::PaymentRequest).await
}

/// GET /orders (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Query(query): Query<OrderListQuery>,
) -> Result<ApiResponse<Vec<Order>>, ApiError> {
    let filter = query.apply(OrderFilter::new())?;
    let page = query.list.page();
    let orders = state
        .store
        .list_orders(&filter, &page, &query.list.sort(ORDER_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(orders, &page))
}

/// GET /orders/user: the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<OrderListQuery>,
) -> Result<ApiResponse<Vec<Order>>, ApiError> {
    let filter = query.apply(OrderFilter::for_user(auth.id))?;
    let page = query.list.page();
    let orders = state
        .store
        .list_orders(&filter, &page, &query.list.sort(ORDER_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(orders, &page))
}

/// GET /orders/workshop/{workshop_id} (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn list_for_workshop<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(workshop_id): Path<String>,
    Query(query): Query<OrderListQuery>,
) -> Result<ApiResponse<Vec<Order>>, ApiError> {
    let workshop_id: WorkshopId = parse_id(&workshop_id, "Workshop")?;
    let filter = query.apply(OrderFilter::for_workshop(workshop_id))?;
    let page = query.list.page();
    let orders = state
        .store
        .list_orders(&filter, &page, &query.list.sort(ORDER_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(orders, &page))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Order>, ApiError> {
    let caller = load_caller(&state.store, auth).await?;
    let order = state
        .store
        .get_order(parse_id(&id, "Order")?)
        .await?
        .filter(|o| can_see(&caller, o.user_id))
        .ok_or_else(|| ApiError::not_found("Order"))?;
    Ok(ApiResponse::ok(order))
}

/// PATCH /orders/{id} (admin): note and status edits.
#[tracing::instrument(skip(state, _admin, body))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Result<Json<UpdateOrder>, JsonRejection>,
) -> Result<ApiResponse<Order>, ApiError> {
    let id: OrderId = parse_id(&id, "Order")?;
    let update = optional_json(body)?.validate()?;

    let order = state
        .store
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;
    let updated = order.apply_update(update, Utc::now())?;
    let saved = state
        .store
        .update_order(&updated)
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;

    tracing::info!(order_id = %id, order_status = %saved.order_status, "order updated");
    Ok(ApiResponse::ok(saved).with_message("Order updated successfully"))
}

/// DELETE /orders/{id} (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order = state
        .store
        .delete_order(parse_id(&id, "Order")?)
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;
    Ok(ApiResponse::ok(order).with_message("Order deleted successfully"))
}

async fn cancel_with<S: Store + Clone + 'static>(
    state: &AppState<S>,
    auth: AuthUser,
    id: &str,
    body: Result<Json<CancelOrder>, JsonRejection>,
    flow: PaymentFlow,
) -> Result<ApiResponse<Order>, ApiError> {
    let order_id: OrderId = parse_id(id, "Order")?;
    let request = optional_json(body)?.validate()?;
    let order = state
        .checkout
        .cancel_order(auth.id, order_id, request, flow)
        .await?;
    Ok(ApiResponse::ok(order).with_message("Order cancelled successfully"))
}

/// PATCH /orders/cancel/{id}: cancel an invoice-flow order.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<CancelOrder>, JsonRejection>,
) -> Result<ApiResponse<Order>, ApiError> {
    cancel_with(&state, auth, &id, body, PaymentFlow::Invoice).await
}

/// PATCH /orders/payment-request/cancel/{id}: cancel a payment-request-flow order.
#[tracing::instrument(skip(state, body))]
pub async fn cancel_payment_request<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<CancelOrder>, JsonRejection>,
) -> Result<ApiResponse<Order>, ApiError> {
    cancel_with(&state, auth, &id, body, PaymentFlow::PaymentRequest).await
}
