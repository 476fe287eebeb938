//! Guarantor request route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn guarantor_routes() -> Router<AppState> {
    Router::new()
        .route("/api/guarantor-requests", post(create_guarantor_request))
        .route(
            "/api/guarantor-requests/pending",
            get(list_pending_guarantor_requests),
        )
        .route("/api/guarantor-requests/:id", get(get_guarantor_request))
        .route(
            "/api/guarantor-requests/:id/respond",
            post(respond_guarantor_request),
        )
}
