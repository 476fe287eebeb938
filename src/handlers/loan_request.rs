//! Loan request API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::LendingResult;
use crate::loan_request::{CreateLoanRequest, LoanRequest, LoanRequestService, RequestRecord};
use crate::models::{Actor, ApiResponse};

/// Create a loan request together with its guarantor request
pub async fn create_loan_request(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
    Json(request): Json<CreateLoanRequest>,
) -> LendingResult<(StatusCode, Json<ApiResponse<RequestRecord>>)> {
    let record = service.create(actor, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

pub async fn cancel_loan_request(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<LoanRequest>>> {
    let request = service.cancel(actor, id).await?;
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn list_my_loan_requests(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
) -> LendingResult<Json<ApiResponse<Vec<LoanRequest>>>> {
    let requests = service.list_mine(actor).await?;
    Ok(Json(ApiResponse::ok(requests)))
}

pub async fn get_loan_request(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<LoanRequest>>> {
    let request = service.get_loan_request(actor, id).await?;
    Ok(Json(ApiResponse::ok(request)))
}

/// Guaranteed requests waiting on one of the lender's brochures
pub async fn list_lender_loan_requests(
    State(service): State<Arc<LoanRequestService>>,
    actor: Actor,
) -> LendingResult<Json<ApiResponse<Vec<LoanRequest>>>> {
    let requests = service.list_for_lender(actor).await?;
    Ok(Json(ApiResponse::ok(requests)))
}
