//! Guarantor request API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::LendingResult;
use crate::loan_request::{
    CreateLoanRequest, GuarantorRequest, LoanRequestService, RespondGuarantorRequest,
};
use crate::models::{Actor, ApiResponse};

/// Nominate a guarantor. The guarantor request never exists on its own, so
/// this opens the loan request it backs as well.
pub async fn create_guarantor_request(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
    Json(request): Json<CreateLoanRequest>,
) -> LendingResult<(StatusCode, Json<ApiResponse<GuarantorRequest>>)> {
    let record = service.create(actor, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(record.guarantor_request)),
    ))
}

pub async fn respond_guarantor_request(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<RespondGuarantorRequest>,
) -> LendingResult<Json<ApiResponse<GuarantorRequest>>> {
    let request = service.respond(actor, id, body.status).await?;
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn list_pending_guarantor_requests(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
) -> LendingResult<Json<ApiResponse<Vec<GuarantorRequest>>>> {
    let requests = service.list_pending(actor).await?;
    Ok(Json(ApiResponse::ok(requests)))
}

pub async fn get_guarantor_request(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<GuarantorRequest>>> {
    let request = service.get_guarantor_request(actor, id).await?;
    Ok(Json(ApiResponse::ok(request)))
}
