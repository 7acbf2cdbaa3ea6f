//! Payment error types.

use std::time::Duration;

use common::CarServiceId;
use domain::DomainError;
use serde::Deserialize;
use store::StoreError;
use thiserror::Error;

/// Message patterns mapped to the request field a gateway error refers to.
const FIELD_PATTERNS: &[(&str, &str)] = &[
    ("payment method", "payment_method"),
    ("payment_method", "payment_method"),
    ("invoice", "invoice"),
    ("disbursement", "disbursement"),
    ("virtual account", "virtual_account"),
    ("virtual_account", "virtual_account"),
    ("e-wallet", "ewallet"),
    ("ewallet", "ewallet"),
    ("qr", "qr_code"),
    ("card", "card"),
    ("customer", "customer"),
    ("balance", "balance"),
    ("refund", "refund"),
];

/// An error response from the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayError {
    /// HTTP status the gateway answered with.
    pub status: u16,
    /// Gateway error code, e.g. `API_VALIDATION_ERROR`.
    pub error_code: String,
    pub message: String,
}

/// Body of a gateway error response.
#[derive(Debug, Deserialize)]
pub(crate) struct GatewayErrorBody {
    pub error_code: Option<String>,
    pub message: Option<String>,
}

impl GatewayError {
    pub fn new(status: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            message: message.into(),
        }
    }

    /// A transport failure: the gateway could not be reached or answered garbage.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(502, "GATEWAY_UNREACHABLE", message)
    }

    /// Best guess of the request field the error is about.
    pub fn field(&self) -> &'static str {
        let message = self.message.to_ascii_lowercase();
        FIELD_PATTERNS
            .iter()
            .find(|(pattern, _)| message.contains(pattern))
            .map(|(_, field)| *field)
            .unwrap_or("xendit")
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16()).unwrap_or(502);
        Self::new(status, "GATEWAY_UNREACHABLE", err.to_string())
    }
}

/// Errors raised by checkout, cancellation and webhook processing.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// A referenced record does not exist, or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Missing car services: {}", join_ids(.0))]
    MissingCarServices(Vec<CarServiceId>),

    #[error("Phone number is required")]
    PhoneNumberRequired,

    /// The payment method lacks the channel settings its type needs.
    #[error("{0} configuration not found")]
    MissingChannelConfig(&'static str),

    /// The transaction has no gateway reference for the requested flow.
    #[error("{0} not found")]
    MissingGatewayReference(&'static str),

    #[error("Xendit refund failed")]
    RefundFailed,

    #[error("No transaction found: {0}")]
    UnknownTransaction(String),

    #[error("Payment update timed out after {0:?}")]
    Timeout(Duration),

    #[error("Error processing webhook after retries")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<PaymentError>,
    },

    #[error("Xendit error: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl PaymentError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::Store(e) => e.is_transient(),
            PaymentError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => PaymentError::NotFound(entity),
            other => PaymentError::Store(other),
        }
    }
}

fn join_ids(ids: &[CarServiceId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
