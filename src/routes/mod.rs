//! Route definitions for the TrustLend API

mod contract;
mod guarantor;
mod loan_request;
mod payment;

pub use contract::contract_routes;
pub use guarantor::guarantor_routes;
pub use loan_request::loan_request_routes;
pub use payment::payment_routes;

use axum::{routing::get, Router};

use crate::handlers::health_check;
use crate::middleware;
use crate::state::AppState;

/// The full API with per-request middleware. Transport concerns such as CORS
/// are layered on by the binary.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(loan_request_routes())
        .merge(guarantor_routes())
        .merge(contract_routes())
        .merge(payment_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
