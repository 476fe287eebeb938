//! Contract API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::contract::{Contract, ContractService, CreateContractRequest, ScheduleView};
use crate::error::LendingResult;
use crate::models::{Actor, ApiResponse};
use crate::payment::{PaymentRedirect, Transaction};

/// Lender accepts a guaranteed loan request
pub async fn create_contract(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Json(request): Json<CreateContractRequest>,
) -> LendingResult<(StatusCode, Json<ApiResponse<Contract>>)> {
    let contract = service.create_from_request(actor, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(contract))))
}

pub async fn get_contract(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<Contract>>> {
    let contract = service.get(actor, id).await?;
    Ok(Json(ApiResponse::ok(contract)))
}

pub async fn sign_contract(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<Contract>>> {
    let contract = service.sign(actor, id).await?;
    Ok(Json(ApiResponse::ok(contract)))
}

pub async fn initiate_disbursal(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<PaymentRedirect>>> {
    let redirect = service.initiate_disbursal_payment(actor, id).await?;
    Ok(Json(ApiResponse::ok(redirect)))
}

pub async fn initiate_emi_payment(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<PaymentRedirect>>> {
    let redirect = service.initiate_emi_payment(actor, id).await?;
    Ok(Json(ApiResponse::ok(redirect)))
}

pub async fn confirm_receipt(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<Contract>>> {
    let contract = service.confirm_receipt(actor, id).await?;
    Ok(Json(ApiResponse::ok(contract)))
}

pub async fn get_emi_schedule(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<ScheduleView>>> {
    let schedule = service.emi_schedule(actor, id).await?;
    Ok(Json(ApiResponse::ok(schedule)))
}

pub async fn get_payment_history(
    State(service): State<Arc<ContractService>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> LendingResult<Json<ApiResponse<Vec<Transaction>>>> {
    let history = service.payment_history(actor, id).await?;
    Ok(Json(ApiResponse::ok(history)))
}
