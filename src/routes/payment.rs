//! Payment webhook route

use axum::{routing::post, Router};

use crate::handlers::payment_webhook;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/api/payments/webhook", post(payment_webhook))
}
