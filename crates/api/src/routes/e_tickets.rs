//! E-ticket queries.

use std::sync::Arc;

use axum::Extension;
use axum::extract::{Path, Query, State};
use common::ETicketId;
use domain::ETicket;
use serde_json::{Value, json};
use store::{Store, TICKET_SORT_FIELDS, TicketFilter};

use super::{ListQuery, can_see, load_caller, parse_id};
use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// GET /e-tickets (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<ETicket>>, ApiError> {
    let page = query.page();
    let tickets = state
        .store
        .list_e_tickets(&TicketFilter::new(), &page, &query.sort(TICKET_SORT_FIELDS))
        .await?;
    Ok(ApiResponse::page(tickets, &page))
}

/// GET /e-tickets/user
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<ETicket>>, ApiError> {
    let page = query.page();
    let tickets = state
        .store
        .list_e_tickets(
            &TicketFilter::for_user(auth.id),
            &page,
            &query.sort(TICKET_SORT_FIELDS),
        )
        .await?;
    Ok(ApiResponse::page(tickets, &page))
}

/// GET /e-tickets/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ETicket>, ApiError> {
    let caller = load_caller(&state.store, auth).await?;
    let ticket = state
        .store
        .get_e_ticket(parse_id(&id, "E-Ticket")?)
        .await?
        .filter(|t| can_see(&caller, t.user_id))
        .ok_or_else(|| ApiError::not_found("E-Ticket"))?;
    Ok(ApiResponse::ok(ticket))
}

/// DELETE /e-tickets/{id} (admin)
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id: ETicketId = parse_id(&id, "E-Ticket")?;
    if !state.store.delete_e_ticket(id).await? {
        return Err(ApiError::not_found("E-Ticket"));
    }
    Ok(ApiResponse::ok(json!({})).with_message("E-Ticket deleted successfully"))
}
