//! API server entry point.

use std::sync::Arc;

use api::auth::AuthKeys;
use api::{AppState, Config};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{
    InMemoryPaymentGateway, PaymentGateway, RedirectUrls, XenditConfig, XenditGateway,
};
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn payment_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match &config.xendit_secret_key {
        Some(secret_key) => Arc::new(XenditGateway::new(XenditConfig {
            base_url: config.xendit_base_url.clone(),
            secret_key: secret_key.clone(),
        })),
        None => {
            tracing::warn!("XENDIT_SECRET_KEY not set, using the in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

async fn serve<S: Store + Clone + 'static>(
    config: &Config,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let state = AppState::new(
        store,
        payment_gateway(config),
        RedirectUrls {
            success: config.success_redirect_url.clone(),
            failure: config.failure_redirect_url.clone(),
        },
        AuthKeys::new(&config.jwt_secret),
        config.xendit_callback_token.clone(),
    );
    let app = api::create_app(Arc::new(state), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("connected to Postgres, migrations applied");
            serve(&config, store, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(&config, InMemoryStore::new(), metrics_handle).await
        }
    }
}
