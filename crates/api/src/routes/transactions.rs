//! Transaction queries, deletion, and test-mode payment simulation.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use common::{Money, TransactionId};
use domain::{DomainError, FieldError, PaymentStatus, TransactionDetails};
use serde::Deserialize;
use serde_json::{Value, json};
use store::{Store, TRANSACTION_SORT_FIELDS, TransactionFilter};

use super::{ListQuery, can_see, load_caller, parse_filter, parse_id};
use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    #[serde(flatten)]
    pub list: ListQuery,
    pub payment_status: Option<String>,
    /// Payment method name, matched case-insensitively.
    pub payment_method: Option<String>,
}

impl TransactionListQuery {
    pub(crate) fn apply(&self, filter: TransactionFilter) -> Result<TransactionFilter, ApiError> {
        let method = self
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        Ok(filter
            .payment_status(parse_filter::<PaymentStatus>(
                "paymentStatus",
                self.payment_status.as_deref(),
            )?)
            .payment_method_name(method))
    }
}

#[derive(Debug, Deserialize)]
pub struct SimulatePayment {
    pub amount: Option<Money>,
}

/// GET /transactions (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Query(query): Query<TransactionListQuery>,
) -> Result<ApiResponse<Vec<TransactionDetails>>, ApiError> {
    let filter = query.apply(TransactionFilter::new())?;
    let page = query.list.page();
    let transactions = state
        .store
        .list_transactions(&filter, &page, &query.list.sort(TRANSACTION_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(transactions, &page))
}

/// GET /transactions/user: the caller's transactions.
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<TransactionListQuery>,
) -> Result<ApiResponse<Vec<TransactionDetails>>, ApiError> {
    let filter = query.apply(TransactionFilter::for_user(auth.id))?;
    let page = query.list.page();
    let transactions = state
        .store
        .list_transactions(&filter, &page, &query.list.sort(TRANSACTION_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(transactions, &page))
}

/// GET /transactions/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<ApiResponse<TransactionDetails>, ApiError> {
    let caller = load_caller(&state.store, auth).await?;
    let details = state
        .store
        .get_transaction(parse_id(&id, "Transaction")?)
        .await?
        .filter(|d| can_see(&caller, d.transaction.user_id))
        .ok_or_else(|| ApiError::not_found("Transaction"))?;
    Ok(ApiResponse::ok(details))
}

/// DELETE /transactions/{id} (admin): removes the transaction with its orders and tickets.
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id: TransactionId = parse_id(&id, "Transaction")?;
    if !state.store.delete_transaction(id).await? {
        return Err(ApiError::not_found("Transaction"));
    }
    tracing::info!(transaction_id = %id, "transaction deleted");
    Ok(ApiResponse::ok(json!({})).with_message("Transaction deleted successfully"))
}

/// POST /transactions/simulate/{reference_id}: pays a payment-request charge
/// in the gateway's test mode. `reference_id` is the gateway payment method id.
#[tracing::instrument(skip(state, body))]
pub async fn simulate<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(reference_id): Path<String>,
    body: Result<Json<SimulatePayment>, JsonRejection>,
) -> Result<ApiResponse<Value>, ApiError> {
    let Json(request) = body?;
    let amount = request
        .amount
        .filter(|a| a.is_positive())
        .ok_or_else(|| {
            DomainError::Validation(vec![FieldError::new(
                "amount",
                "Amount must be a positive number",
                "too_small",
            )])
        })?;

    state.checkout.simulate_payment(&reference_id, amount).await?;
    Ok(ApiResponse::created("Successfully paid", json!({})))
}
