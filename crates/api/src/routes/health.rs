//! Liveness probe.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::response::ApiResponse;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub time: DateTime<Utc>,
}

/// GET /health
pub async fn check() -> ApiResponse<Health> {
    ApiResponse::ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        time: Utc::now(),
    })
}
