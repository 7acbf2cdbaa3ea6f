//! Payment method catalog.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use common::PaymentMethodId;
use domain::{PaymentMethod, PaymentMethodInput};
use serde_json::{Value, json};
use store::{PAYMENT_METHOD_SORT_FIELDS, Store};

use super::{ListQuery, parse_id};
use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// GET /payment-methods
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<PaymentMethod>>, ApiError> {
    let page = query.page();
    let methods = state
        .store
        .list_payment_methods(&page, &query.sort(PAYMENT_METHOD_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(methods, &page))
}

/// GET /payment-methods/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<PaymentMethod>, ApiError> {
    let method = state
        .store
        .get_payment_method(parse_id(&id, "Payment method")?)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment method"))?;
    Ok(ApiResponse::ok(method))
}

/// POST /payment-methods (admin)
#[tracing::instrument(skip(state, _admin, body))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    body: Result<Json<PaymentMethodInput>, JsonRejection>,
) -> Result<ApiResponse<PaymentMethod>, ApiError> {
    let Json(input) = body?;
    let method = state
        .store
        .create_payment_method(input.into_draft()?)
        .await?;
    tracing::info!(payment_method_id = %method.id, name = %method.name, "payment method created");
    Ok(ApiResponse::created(
        "Payment method created successfully",
        method,
    ))
}

/// PATCH /payment-methods/{id} (admin): partial update.
#[tracing::instrument(skip(state, _admin, body))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Result<Json<PaymentMethodInput>, JsonRejection>,
) -> Result<ApiResponse<PaymentMethod>, ApiError> {
    let id: PaymentMethodId = parse_id(&id, "Payment method")?;
    let Json(input) = body?;

    let existing = state
        .store
        .get_payment_method(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment method"))?;
    let method = state
        .store
        .update_payment_method(id, input.apply_to(&existing)?)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment method"))?;
    Ok(ApiResponse::ok(method).with_message("Payment method updated successfully"))
}

/// DELETE /payment-methods/{id} (admin). Fails while transactions use the method.
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id: PaymentMethodId = parse_id(&id, "Payment method")?;
    if !state.store.delete_payment_method(id).await? {
        return Err(ApiError::not_found("Payment method"));
    }
    Ok(ApiResponse::ok(json!({})).with_message("Payment method deleted successfully"))
}
