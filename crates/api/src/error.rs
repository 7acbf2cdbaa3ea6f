//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, FieldError};
use payments::{GatewayError, PaymentError};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// One entry of the `errors` array of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&FieldError> for ErrorDetail {
    fn from(err: &FieldError) -> Self {
        Self {
            field: err.field.clone(),
            message: err.message.clone(),
            code: err.code.map(str::to_string),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ErrorDetail>,
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or expired credentials.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Credentials are valid but not sufficient.
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{entity} not found"))
    }

    /// Status code, message and field details of the response.
    fn parts(&self) -> (StatusCode, String, Vec<ErrorDetail>) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string(), Vec::new()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string(), Vec::new()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string(), Vec::new()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), Vec::new()),
            ApiError::Domain(err) => domain_parts(err),
            ApiError::Store(err) => store_parts(err),
            ApiError::Payment(err) => payment_parts(err),
        }
    }
}

fn domain_parts(err: &DomainError) -> (StatusCode, String, Vec<ErrorDetail>) {
    let details = err.field_errors().iter().map(ErrorDetail::from).collect();
    (StatusCode::BAD_REQUEST, err.to_string(), details)
}

fn store_parts(err: &StoreError) -> (StatusCode, String, Vec<ErrorDetail>) {
    match err {
        StoreError::NotFound { entity, .. } => {
            (StatusCode::NOT_FOUND, format!("{entity} not found"), Vec::new())
        }
        StoreError::Duplicate(entity) => (
            StatusCode::BAD_REQUEST,
            err.to_string(),
            vec![ErrorDetail {
                field: "name".to_string(),
                message: format!("{entity} with this name already exists"),
                code: Some("unique_violation".to_string()),
            }],
        ),
        StoreError::ForeignKey(constraint) => (
            StatusCode::BAD_REQUEST,
            format!("Foreign key constraint failed on field \"{constraint}\""),
            vec![ErrorDetail {
                field: constraint.clone(),
                message: err.to_string(),
                code: Some("foreign_key_violation".to_string()),
            }],
        ),
        StoreError::Conflict(_) => (StatusCode::CONFLICT, err.to_string(), Vec::new()),
        StoreError::Decode(_) | StoreError::Database(_) | StoreError::Migration(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An error occurred".to_string(),
            vec![ErrorDetail {
                field: "database".to_string(),
                message: err.to_string(),
                code: None,
            }],
        ),
    }
}

fn gateway_parts(err: &GatewayError) -> (StatusCode, String, Vec<ErrorDetail>) {
    let status = StatusCode::from_u16(err.status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        format!("Xendit error: {}", err.message),
        vec![ErrorDetail {
            field: err.field().to_string(),
            message: err.message.clone(),
            code: Some(err.error_code.clone()),
        }],
    )
}

fn payment_parts(err: &PaymentError) -> (StatusCode, String, Vec<ErrorDetail>) {
    let status = match err {
        PaymentError::Gateway(gateway) => return gateway_parts(gateway),
        PaymentError::Domain(domain) => return domain_parts(domain),
        PaymentError::Store(store) => return store_parts(store),
        PaymentError::NotFound(_)
        | PaymentError::MissingCarServices(_)
        | PaymentError::MissingGatewayReference(_)
        | PaymentError::UnknownTransaction(_) => StatusCode::NOT_FOUND,
        PaymentError::PhoneNumberRequired | PaymentError::MissingChannelConfig(_) => {
            StatusCode::BAD_REQUEST
        }
        PaymentError::RefundFailed => StatusCode::BAD_GATEWAY,
        PaymentError::Timeout(_) | PaymentError::RetriesExhausted { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string(), Vec::new())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        (status, Json(ErrorBody { message, errors })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use domain::OrderStatus;

    use super::*;

    #[test]
    fn test_validation_errors_carry_fields() {
        let err = ApiError::from(DomainError::Validation(vec![FieldError::required("userCarId")]));
        let (status, message, errors) = err.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Validation failed");
        assert_eq!(errors[0].field, "userCarId");
        assert_eq!(errors[0].code.as_deref(), Some("invalid_type"));
    }

    #[test]
    fn test_gateway_errors_keep_gateway_status() {
        let err = ApiError::from(PaymentError::Gateway(GatewayError::new(
            404,
            "INVOICE_NOT_FOUND_ERROR",
            "Invoice not found",
        )));
        let (status, message, errors) = err.parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Xendit error: Invoice not found");
        assert_eq!(errors[0].field, "invoice");
        assert_eq!(errors[0].code.as_deref(), Some("INVOICE_NOT_FOUND_ERROR"));
    }

    #[test]
    fn test_payment_error_statuses() {
        let cases = [
            (PaymentError::NotFound("Order"), StatusCode::NOT_FOUND),
            (PaymentError::PhoneNumberRequired, StatusCode::BAD_REQUEST),
            (
                PaymentError::Domain(DomainError::NotCancellable(OrderStatus::Completed)),
                StatusCode::BAD_REQUEST,
            ),
            (
                PaymentError::UnknownTransaction("tx".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                PaymentError::RetriesExhausted {
                    attempts: 4,
                    last_error: Box::new(PaymentError::Timeout(std::time::Duration::from_secs(5))),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).parts().0, expected);
        }
    }

    #[test]
    fn test_store_not_found_hides_id() {
        let err = ApiError::from(StoreError::not_found("Transaction", "abc"));
        let (status, message, _) = err.parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Transaction not found");
    }
}
