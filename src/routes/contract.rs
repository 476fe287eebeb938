//! Contract route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn contract_routes() -> Router<AppState> {
    Router::new()
        .route("/api/contracts", post(create_contract))
        .route("/api/contracts/:id", get(get_contract))
        .route("/api/contracts/:id/sign", post(sign_contract))
        .route("/api/contracts/:id/disburse", post(initiate_disbursal))
        .route("/api/contracts/:id/pay-emi", post(initiate_emi_payment))
        .route("/api/contracts/:id/confirm-receipt", post(confirm_receipt))
        .route("/api/contracts/:id/emi-schedule", get(get_emi_schedule))
        .route("/api/contracts/:id/payments", get(get_payment_history))
}
