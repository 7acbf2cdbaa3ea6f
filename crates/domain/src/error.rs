//! Domain error types.

use serde::Serialize;
use thiserror::Error;

use crate::status::OrderStatus;

/// A single invalid request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, "Required", "invalid_type")
    }

    pub fn too_long(field: &str, max: usize) -> Self {
        Self::new(field, format!("Max {max} characters"), "too_big")
    }
}

/// Errors raised by domain rules, before any I/O happens.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request failed field-level validation.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// The order is already completed or cancelled.
    #[error("Order cannot be cancelled because it's already {0}")]
    NotCancellable(OrderStatus),

    /// A closed order's status cannot be changed.
    #[error("Order status cannot be changed because it's already {0}")]
    OrderClosed(OrderStatus),
}

impl DomainError {
    /// Returns the field errors of a validation failure, if any.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            DomainError::Validation(errors) => errors,
            _ => &[],
        }
    }
}
