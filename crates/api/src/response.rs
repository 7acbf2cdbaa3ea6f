//! Success envelopes: `{message, data}` plus `pagination` for lists.

use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{Page, PageRequest, Pagination};
use serde::Serialize;

#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: Cow<'static, str>,
    data: T,
    pagination: Option<Pagination>,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    message: &'a str,
    data: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<&'a Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    /// `200 OK` with the default "Success" message.
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: Cow::Borrowed("Success"),
            data,
            pagination: None,
        }
    }

    pub fn created(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self::ok(data)
            .with_status(StatusCode::CREATED)
            .with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    pub fn page(page: Page<T>, request: &PageRequest) -> Self {
        let pagination = Pagination::new(request, page.total);
        Self {
            pagination: Some(pagination),
            ..Self::ok(page.items)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            message: &self.message,
            data: &self.data,
            pagination: self.pagination.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}
