use anyhow::Context;
use payflow_backend::api::{self, AppState};
use payflow_backend::config::{AppConfig, StoreBackend};
use payflow_backend::database::memory_store::InMemoryPaymentStore;
use payflow_backend::database::repository::PaymentStore;
use payflow_backend::health::HealthChecker;
use payflow_backend::logging::init_tracing;
use payflow_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use payflow_backend::payments::factory::GatewayFactory;
use payflow_backend::payments::webhook::WebhookVerifier;
use payflow_backend::services::payment_orchestrator::PaymentOrchestrator;
use payflow_backend::services::webhook_processor::WebhookProcessor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    match config.store {
        StoreBackend::Memory => {
            warn!("Using in-memory payment store; payments are lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
        #[cfg(feature = "database")]
        StoreBackend::Postgres => {
            use payflow_backend::database::payment_repository::PgPaymentStore;
            use payflow_backend::database::{init_pool_from_config, run_migrations};

            let database = config
                .database
                .as_ref()
                .context("STORE_BACKEND=postgres requires DATABASE_URL")?;
            let pool = init_pool_from_config(database).await?;
            run_migrations(&pool).await?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "Postgres payment store ready"
            );
            Ok(Arc::new(PgPaymentStore::new(pool)))
        }
        #[cfg(not(feature = "database"))]
        StoreBackend::Postgres => {
            anyhow::bail!("STORE_BACKEND=postgres requires the `database` feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = ?config.store,
        gateway = ?config.gateway.kind,
        "Starting payment service"
    );

    let store = build_store(&config).await?;

    let gateway = GatewayFactory::new(config.gateway.clone(), config.resilience.clone())
        .client()
        .context("failed to build gateway client")?;
    let breaker = gateway.breaker();

    let secret = match &config.webhook.secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("STRIPE_WEBHOOK_SECRET not set; every webhook will be rejected");
            String::new()
        }
    };
    let webhooks = Arc::new(WebhookProcessor::new(
        WebhookVerifier::new(secret, config.webhook.tolerance),
        Arc::clone(&store),
    ));

    let orchestrator = Arc::new(PaymentOrchestrator::new(Arc::clone(&store), gateway));
    let health_checker = HealthChecker::new(store, breaker);

    let app = api::router(AppState {
        orchestrator,
        webhooks,
        health_checker,
        request_timeout: config.server.request_timeout(),
    })
    .layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}
