//! HTTP API of the marketplace backend.
//!
//! REST endpoints for orders, transactions, e-tickets, histories and payment
//! methods under `/api/v1`, plus the gateway webhooks. Handlers answer in a
//! `{message, data}` envelope; failures in `{message, errors}`. Observability
//! comes from `tracing` spans and Prometheus metrics at `/metrics`.

pub mod auth;
pub mod config;
pub mod error;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use state::AppState;

/// Routes reachable with a valid bearer token. Admin-only handlers check the
/// role themselves through [`auth::AdminUser`].
fn authenticated<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    use routes::{e_tickets, histories, orders, payment_methods, transactions};

    Router::new()
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route(
            "/orders/payment-request",
            post(orders::create_with_payment_request::<S>),
        )
        .route("/orders/user", get(orders::list_for_user::<S>))
        .route(
            "/orders/workshop/{workshop_id}",
            get(orders::list_for_workshop::<S>),
        )
        .route("/orders/cancel/{id}", patch(orders::cancel::<S>))
        .route(
            "/orders/payment-request/cancel/{id}",
            patch(orders::cancel_payment_request::<S>),
        )
        .route(
            "/orders/{id}",
            get(orders::get::<S>)
                .patch(orders::update::<S>)
                .delete(orders::delete::<S>),
        )
        .route("/transactions", get(transactions::list::<S>))
        .route("/transactions/user", get(transactions::list_for_user::<S>))
        .route(
            "/transactions/simulate/{reference_id}",
            post(transactions::simulate::<S>),
        )
        .route(
            "/transactions/{id}",
            get(transactions::get::<S>).delete(transactions::delete::<S>),
        )
        .route("/e-tickets", get(e_tickets::list::<S>))
        .route("/e-tickets/user", get(e_tickets::list_for_user::<S>))
        .route(
            "/e-tickets/{id}",
            get(e_tickets::get::<S>).delete(e_tickets::delete::<S>),
        )
        .route("/histories", get(histories::list::<S>))
        .route("/histories/user", get(histories::list_for_user::<S>))
        .route("/histories/{id}", get(histories::get::<S>))
        .route("/payment-methods", post(payment_methods::create::<S>))
        .route(
            "/payment-methods/{id}",
            patch(payment_methods::update::<S>).delete(payment_methods::delete::<S>),
        )
}

/// Routes without a bearer token: the public catalog and gateway callbacks.
fn public<S: Store + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    use routes::{payment_methods, webhooks};

    Router::new()
        .route("/payment-methods", get(payment_methods::list::<S>))
        .route("/payment-methods/{id}", get(payment_methods::get::<S>))
        .route("/webhooks/invoice", post(webhooks::invoice::<S>))
        .route(
            "/webhooks/payment-request",
            post(webhooks::payment_request::<S>),
        )
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    let api = authenticated::<S>()
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_auth,
        ))
        .merge(public::<S>())
        .with_state(state);

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", api)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
