//! Payment gateway webhook

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;

use crate::error::{LendingError, LendingResult};
use crate::payment::{CallbackVerifier, ReconciliationEngine, ReconciliationOutcome, WebhookPayload};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: Option<ReconciliationOutcome>,
}

/// Gateway callback. Verified, parsed and reconciled; anything that gets past
/// parsing is acknowledged with 200 so the gateway stops retrying.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> LendingResult<Json<WebhookAck>> {
    handle_callback(
        state.callback_verifier.as_ref(),
        &state.reconciliation_engine,
        &headers,
        &body,
    )
    .await
    .map(Json)
}

async fn handle_callback(
    verifier: &dyn CallbackVerifier,
    engine: &ReconciliationEngine,
    headers: &HeaderMap,
    body: &[u8],
) -> LendingResult<WebhookAck> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = verifier.verify(authorization, body) {
        tracing::warn!(error = %e, "Rejected unverified payment callback");
        return Err(e);
    }

    let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed payment callback");
        LendingError::from(e)
    })?;

    let Some(event) = payload.into_event()? else {
        tracing::info!("Ignoring unsupported payment callback type");
        return Ok(WebhookAck {
            received: true,
            outcome: None,
        });
    };

    let outcome = engine.handle_event(&event).await?;
    Ok(WebhookAck {
        received: true,
        outcome: Some(outcome),
    })
}
