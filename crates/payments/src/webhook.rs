//! Settlement of gateway webhook callbacks.
//!
//! Both callback flavours are normalized into a [`GatewayEvent`] and applied
//! with [`Store::apply_payment_update`] under a [`RetryPolicy`]. Serialization
//! conflicts between concurrent callbacks are retried; an unknown transaction
//! is not.

use std::time::Instant;

use chrono::{DateTime, Utc};
use common::TransactionId;
use domain::{GatewayEvent, GatewayStatus};
use serde::Deserialize;
use store::{PaymentUpdateOutcome, Store, StoreError};

use crate::error::{PaymentError, Result};
use crate::retry::RetryPolicy;

/// `external_id` of the invoice callback sent from the gateway dashboard's test button.
pub const TEST_INVOICE_EXTERNAL_ID: &str = "invoice_123124123";

/// `business_id` of payment-request callbacks sent from the dashboard's test button.
pub const TEST_BUSINESS_ID: &str = "sample_business_id";

/// Invoice status callback. Only the fields we act on are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceWebhook {
    #[serde(default)]
    pub id: Option<String>,
    /// Our transaction id.
    pub external_id: String,
    pub status: GatewayStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_channel: Option<String>,
}

impl InvoiceWebhook {
    pub fn is_test(&self) -> bool {
        self.external_id == TEST_INVOICE_EXTERNAL_ID
    }

    pub fn into_event(self) -> GatewayEvent {
        GatewayEvent {
            reference: self.external_id,
            status: self.status,
            paid_at: self.paid_at,
        }
    }
}

/// Payment-request status callback.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequestWebhook {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub business_id: String,
    pub data: PaymentRequestWebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequestWebhookData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payment_request_id: Option<String>,
    /// Our transaction id.
    pub reference_id: String,
    pub status: GatewayStatus,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl PaymentRequestWebhook {
    pub fn is_test(&self) -> bool {
        self.business_id == TEST_BUSINESS_ID
    }

    /// The capture time of a payment request is its last update.
    pub fn into_event(self) -> GatewayEvent {
        GatewayEvent {
            reference: self.data.reference_id,
            status: self.data.status,
            paid_at: self.data.updated,
        }
    }
}

/// What handling a callback amounted to.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// A dashboard test callback; nothing was read or written.
    Test,
    Applied(PaymentUpdateOutcome),
}

/// Applies gateway callbacks to transactions, orders and e-tickets.
pub struct WebhookProcessor<S: Store> {
    store: S,
    policy: RetryPolicy,
}

impl<S: Store> WebhookProcessor<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn process_invoice(&self, payload: InvoiceWebhook) -> Result<WebhookOutcome> {
        if payload.is_test() {
            tracing::info!("invoice test callback acknowledged");
            return Ok(WebhookOutcome::Test);
        }
        self.apply(payload.into_event()).await.map(WebhookOutcome::Applied)
    }

    pub async fn process_payment_request(
        &self,
        payload: PaymentRequestWebhook,
    ) -> Result<WebhookOutcome> {
        if payload.is_test() {
            tracing::info!("payment request test callback acknowledged");
            return Ok(WebhookOutcome::Test);
        }
        self.apply(payload.into_event()).await.map(WebhookOutcome::Applied)
    }

    /// Applies one callback, retrying failures with the configured policy.
    #[tracing::instrument(skip(self, event), fields(reference = %event.reference, status = %event.status))]
    pub async fn apply(&self, event: GatewayEvent) -> Result<PaymentUpdateOutcome> {
        let start = Instant::now();
        let status_label = event.status.as_str().to_ascii_uppercase();

        let result = self.apply_with_retry(&event).await;

        let outcome_label = match &result {
            Ok(outcome) if outcome.transition.is_some() => "applied",
            Ok(_) => "ignored",
            Err(PaymentError::RetriesExhausted { last_error, .. })
                if matches!(**last_error, PaymentError::UnknownTransaction(_)) =>
            {
                "unknown_transaction"
            }
            Err(_) => "failed",
        };
        metrics::counter!(
            "webhook_events_total",
            "status" => status_label,
            "outcome" => outcome_label
        )
        .increment(1);
        metrics::histogram!("webhook_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                if let Some(ticket) = &outcome.ticket {
                    metrics::counter!("e_tickets_issued_total").increment(1);
                    tracing::info!(
                        ticket_number = ticket.ticket_number,
                        order_id = %ticket.order_id,
                        "e-ticket issued"
                    );
                }
                tracing::info!(
                    payment_status = %outcome.transaction.payment_status,
                    outcome = outcome_label,
                    "webhook processed"
                );
            }
            Err(err) => tracing::error!(error = %err, "webhook processing failed"),
        }
        result
    }

    /// Every failure is retried, unknown transactions included.
    async fn apply_with_retry(&self, event: &GatewayEvent) -> Result<PaymentUpdateOutcome> {
        let store = &self.store;
        self.policy
            .run_if(
                |_| true,
                |attempt| async move {
                    tracing::debug!(attempt, "applying payment update");
                    let Ok(id) = event.reference.parse::<TransactionId>() else {
                        return Err(PaymentError::UnknownTransaction(event.reference.clone()));
                    };
                    store
                        .apply_payment_update(id, event)
                        .await
                        .map_err(|err| match err {
                            StoreError::NotFound { .. } => {
                                PaymentError::UnknownTransaction(id.to_string())
                            }
                            other => other.into(),
                        })
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_invoice_payload_decodes() {
        let payload: InvoiceWebhook = serde_json::from_value(json!({
            "id": "579c8d61f23fa4ca35e52da4",
            "external_id": "0b7c3f9e-7d8a-4a4f-9e0c-2f1d2f3c4b5a",
            "user_id": "5781d19b2e2385880609791c",
            "status": "PAID",
            "amount": 151000,
            "paid_at": "2026-10-18T08:15:03.404Z",
            "payment_channel": "QRIS",
        }))
        .unwrap();

        assert!(!payload.is_test());
        let event = payload.into_event();
        assert_eq!(event.status, GatewayStatus::Paid);
        assert!(event.paid_at.is_some());
    }

    #[test]
    fn test_payment_request_payload_decodes() {
        let payload: PaymentRequestWebhook = serde_json::from_value(json!({
            "event": "payment.succeeded",
            "business_id": "5f27a14a9bf05c73dd040bc8",
            "created": "2026-10-18T08:15:03.404Z",
            "data": {
                "id": "ddpy-3cd658ae-25b9-4659-aa36-596ae41a809f",
                "payment_request_id": "pr-1",
                "reference_id": "0b7c3f9e-7d8a-4a4f-9e0c-2f1d2f3c4b5a",
                "status": "SUCCEEDED",
                "updated": "2026-10-18T08:15:04.000Z",
                "payment_method": { "type": "EWALLET" }
            }
        }))
        .unwrap();

        let event = payload.into_event();
        assert_eq!(event.status, GatewayStatus::Succeeded);
        assert_eq!(event.reference, "0b7c3f9e-7d8a-4a4f-9e0c-2f1d2f3c4b5a");
        assert!(event.paid_at.is_some());
    }

    #[test]
    fn test_dashboard_test_callbacks_are_detected() {
        let invoice: InvoiceWebhook = serde_json::from_value(json!({
            "external_id": TEST_INVOICE_EXTERNAL_ID,
            "status": "PAID",
        }))
        .unwrap();
        assert!(invoice.is_test());

        let request: PaymentRequestWebhook = serde_json::from_value(json!({
            "business_id": TEST_BUSINESS_ID,
            "data": { "reference_id": "x", "status": "SUCCEEDED" }
        }))
        .unwrap();
        assert!(request.is_test());
    }
}
