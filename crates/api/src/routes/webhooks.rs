//! Gateway webhook receivers.
//!
//! Both endpoints authenticate the gateway by the `x-callback-token` header
//! and answer in the regular success/error envelopes.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use domain::{ETicket, Order, Transaction};
use payments::{InvoiceWebhook, PaymentRequestWebhook, WebhookOutcome};
use serde::Serialize;
use serde_json::{Value, json};
use store::Store;

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledPayment {
    pub transaction: Transaction,
    pub orders: Vec<Order>,
    pub e_ticket: Option<ETicket>,
}

fn verify_callback_token(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    match token {
        Some(token) if !expected.is_empty() && token == expected => Ok(()),
        _ => {
            metrics::counter!("webhook_unauthorized_total").increment(1);
            Err(ApiError::Unauthorized("Unauthorized webhook request"))
        }
    }
}

fn respond(outcome: WebhookOutcome, test_message: &'static str) -> ApiResponse<Value> {
    match outcome {
        WebhookOutcome::Test => ApiResponse::ok(json!({})).with_message(test_message),
        WebhookOutcome::Applied(outcome) if outcome.transition.is_none() => {
            ApiResponse::ok(json!({})).with_message("Webhook processed successfully")
        }
        WebhookOutcome::Applied(outcome) => {
            let settled = SettledPayment {
                transaction: outcome.transaction,
                orders: outcome.orders,
                e_ticket: outcome.ticket,
            };
            ApiResponse::ok(json!(settled)).with_message("Webhook processed successfully")
        }
    }
}

/// POST /webhooks/invoice
#[tracing::instrument(skip_all)]
pub async fn invoice<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Result<Json<InvoiceWebhook>, JsonRejection>,
) -> Result<ApiResponse<Value>, ApiError> {
    verify_callback_token(&headers, &state.callback_token)?;
    let Json(payload) = body?;
    tracing::info!(
        external_id = %payload.external_id,
        status = %payload.status,
        "invoice webhook received"
    );

    let outcome = state.webhooks.process_invoice(payload).await?;
    Ok(respond(outcome, "Testing invoice webhook success"))
}

/// POST /webhooks/payment-request
#[tracing::instrument(skip_all)]
pub async fn payment_request<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Result<Json<PaymentRequestWebhook>, JsonRejection>,
) -> Result<ApiResponse<Value>, ApiError> {
    verify_callback_token(&headers, &state.callback_token)?;
    let Json(payload) = body?;
    tracing::info!(
        event = payload.event.as_deref().unwrap_or_default(),
        reference_id = %payload.data.reference_id,
        status = %payload.data.status,
        "payment request webhook received"
    );

    let outcome = state.webhooks.process_payment_request(payload).await?;
    Ok(respond(outcome, "Testing payment request webhook success"))
}
