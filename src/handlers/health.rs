//! Health check

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::store::LendingStore;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: String,
    version: &'static str,
}

pub async fn health_check(
    State(store): State<Arc<dyn LendingStore>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (status, code, database) = match store.health_check().await {
        Ok(()) => ("healthy", StatusCode::OK, "connected".to_string()),
        Err(e) => (
            "unhealthy",
            StatusCode::SERVICE_UNAVAILABLE,
            format!("error: {}", e),
        ),
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
