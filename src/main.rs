//! TrustLend Backend Server
//!
//! Serves the lending API, receives payment gateway callbacks and runs the
//! delinquency sweeper.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use trustlend_server::config::Config;
use trustlend_server::contract::{delinquency_sweeper, ContractService};
use trustlend_server::loan_request::LoanRequestService;
use trustlend_server::middleware::{self, ACTING_ROLE_HEADER, USER_ID_HEADER};
use trustlend_server::payment::{
    AcceptAllVerifier, CallbackVerifier, HttpPaymentGateway, PaymentGateway, ReconciliationEngine,
    Sha256CredentialVerifier, SimulatedGateway,
};
use trustlend_server::routes::api_router;
use trustlend_server::state::AppState;
use trustlend_server::store::{LendingStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting TrustLend server");

    let pg_store = PgStore::connect(&config).await?;
    pg_store.migrate().await?;
    let store: Arc<dyn LendingStore> = Arc::new(pg_store);

    let gateway = build_gateway(&config);
    let verifier = build_verifier(&config);

    let loan_request_service = Arc::new(LoanRequestService::new(store.clone()));
    let contract_service = Arc::new(ContractService::new(
        store.clone(),
        gateway,
        chrono::Duration::days(config.default_grace_days),
    ));
    let reconciliation_engine = Arc::new(ReconciliationEngine::new(store.clone()));

    let app_state = AppState::new(
        store,
        loan_request_service,
        contract_service.clone(),
        reconciliation_engine,
        verifier,
    );

    let sweep_interval = std::time::Duration::from_secs(config.delinquency_sweep_secs);
    tokio::spawn(async move {
        tracing::info!("Delinquency sweeper task started");
        delinquency_sweeper(contract_service, sweep_interval).await;
        tracing::error!("Delinquency sweeper task exited unexpectedly");
    });

    let mut app = api_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(&config));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn build_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match &config.payment_gateway_url {
        Some(url) => Arc::new(HttpPaymentGateway::new(
            url.clone(),
            config.payment_client_id.clone().unwrap_or_default(),
            config.payment_client_secret.clone().unwrap_or_default(),
            config.frontend_url.clone(),
        )),
        None => {
            tracing::warn!("PAYMENT_GATEWAY_URL not set, using simulated payment gateway");
            Arc::new(SimulatedGateway::new(config.frontend_url.clone()))
        }
    }
}

fn build_verifier(config: &Config) -> Arc<dyn CallbackVerifier> {
    match &config.webhook_credentials {
        Some(credentials) => Arc::new(Sha256CredentialVerifier::new(
            &credentials.username,
            &credentials.password,
        )),
        None => {
            tracing::warn!(
                "Webhook credentials not set, payment callbacks are accepted without verification"
            );
            Arc::new(AcceptAllVerifier)
        }
    }
}

fn configure_cors(config: &Config) -> CorsLayer {
    let allowed_origins = config.cors_allowed_origins.clone().unwrap_or_default();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(ACTING_ROLE_HEADER),
        ])
        .expose_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
