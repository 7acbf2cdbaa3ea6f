//! Request handlers, one module per resource.

pub mod e_tickets;
pub mod health;
pub mod histories;
pub mod metrics;
pub mod orders;
pub mod payment_methods;
pub mod transactions;
pub mod webhooks;

use std::str::FromStr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use common::{PageRequest, Sort, UserId};
use domain::{DomainError, FieldError, User};
use serde::Deserialize;
use store::{Store, StoreExt};

use crate::auth::AuthUser;
use crate::error::ApiError;

/// Paging and sorting parameters shared by all list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::parse(self.page.as_deref(), self.limit.as_deref())
    }

    pub fn sort(&self, valid_fields: &[&'static str]) -> Sort {
        Sort::parse(
            self.order_by.as_deref(),
            self.order_direction.as_deref(),
            valid_fields,
        )
    }
}

/// Parses a path id. Malformed ids cannot name a row, so they are reported
/// like a missing one.
pub(crate) fn parse_id<T: FromStr>(raw: &str, entity: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found(entity))
}

/// Parses an optional enum filter from the query string. Blank means no filter.
pub(crate) fn parse_filter<T: FromStr>(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<T>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            DomainError::Validation(vec![FieldError::new(
                field,
                format!("Invalid value '{value}'"),
                "invalid_enum_value",
            )])
            .into()
        }),
    }
}

/// Unwraps a JSON body, treating a request without a JSON body as empty.
pub(crate) fn optional_json<T: Default>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

/// Loads the caller, who must still exist.
pub(crate) async fn load_caller<S: Store>(store: &S, auth: AuthUser) -> Result<User, ApiError> {
    Ok(store.require_user(auth.id).await?)
}

/// Regular users only see their own records; admins see everything.
pub(crate) fn can_see(caller: &User, owner: UserId) -> bool {
    caller.role.is_admin() || caller.id == owner
}
