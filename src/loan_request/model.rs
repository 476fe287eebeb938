//! Loan request and guarantor request models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::{LendingError, LendingResult};

/// Loan request status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanRequestStatus {
    Pending,
    GuarantorAccepted,
    Contracting,
    Contracted,
    Cancelled,
}

impl LoanRequestStatus {
    /// Statuses that count towards the one-open-request-per-receiver rule
    pub const ACTIVE: [LoanRequestStatus; 3] = [
        LoanRequestStatus::Pending,
        LoanRequestStatus::GuarantorAccepted,
        LoanRequestStatus::Contracting,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            LoanRequestStatus::Pending | LoanRequestStatus::GuarantorAccepted
        )
    }
}

/// Guarantor request status; `Accepted` and `Declined` are terminal
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "guarantor_request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuarantorRequestStatus {
    Pending,
    Accepted,
    Declined,
}

/// A guarantor's answer
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuarantorResponse {
    Accepted,
    Declined,
}

/// Loan request model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanRequest {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub brochure_ids: Vec<Uuid>,
    pub guarantor_id: Uuid,
    pub status: LoanRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Guarantor request model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct GuarantorRequest {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub guarantor_id: Uuid,
    pub loan_request_id: Uuid,
    pub status: GuarantorRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A loan request and the guarantor request backing it. Always created,
/// loaded and saved together.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestRecord {
    pub loan_request: LoanRequest,
    pub guarantor_request: GuarantorRequest,
}

impl RequestRecord {
    /// Build a fresh pending pair
    pub fn new(receiver_id: Uuid, brochure_ids: Vec<Uuid>, guarantor_id: Uuid) -> Self {
        let now = Utc::now();
        let loan_request = LoanRequest {
            id: Uuid::new_v4(),
            receiver_id,
            brochure_ids,
            guarantor_id,
            status: LoanRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let guarantor_request = GuarantorRequest {
            id: Uuid::new_v4(),
            receiver_id,
            guarantor_id,
            loan_request_id: loan_request.id,
            status: GuarantorRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        Self {
            loan_request,
            guarantor_request,
        }
    }

    /// Record the guarantor's one-shot answer
    pub fn respond(&mut self, response: GuarantorResponse) -> LendingResult<()> {
        if self.guarantor_request.status != GuarantorRequestStatus::Pending {
            return Err(LendingError::state(format!(
                "Guarantor request has already been answered ({:?})",
                self.guarantor_request.status
            )));
        }

        let now = Utc::now();
        match response {
            GuarantorResponse::Accepted => {
                if self.loan_request.status != LoanRequestStatus::Pending {
                    return Err(LendingError::state(format!(
                        "Loan request is {:?} and can no longer be guaranteed",
                        self.loan_request.status
                    )));
                }
                self.guarantor_request.status = GuarantorRequestStatus::Accepted;
                self.loan_request.status = LoanRequestStatus::GuarantorAccepted;
                self.loan_request.updated_at = now;
            }
            GuarantorResponse::Declined => {
                // The pair is one-to-one, so a declined request can never be
                // guaranteed. Close it so the receiver may apply again.
                self.guarantor_request.status = GuarantorRequestStatus::Declined;
                if self.loan_request.status == LoanRequestStatus::Pending {
                    self.loan_request.status = LoanRequestStatus::Cancelled;
                    self.loan_request.updated_at = now;
                }
            }
        }
        self.guarantor_request.updated_at = now;
        Ok(())
    }

    /// Receiver-initiated cancellation
    pub fn cancel(&mut self, receiver_id: Uuid) -> LendingResult<()> {
        if self.loan_request.receiver_id != receiver_id {
            return Err(LendingError::state(
                "You can only cancel your own loan requests",
            ));
        }
        if !self.loan_request.status.is_cancellable() {
            return Err(LendingError::state(
                "Only pending loan requests can be cancelled",
            ));
        }
        self.loan_request.status = LoanRequestStatus::Cancelled;
        self.loan_request.updated_at = Utc::now();
        Ok(())
    }

    /// Move the request to a new status, requiring `expected` as the current one
    pub fn advance(
        &mut self,
        expected: LoanRequestStatus,
        next: LoanRequestStatus,
    ) -> LendingResult<()> {
        if self.loan_request.status != expected {
            return Err(LendingError::state(format!(
                "Loan request is {:?}, expected {:?}",
                self.loan_request.status, expected
            )));
        }
        self.loan_request.status = next;
        self.loan_request.updated_at = Utc::now();
        Ok(())
    }
}

/// Request DTO for creating a loan request together with its guarantor request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanRequest {
    #[validate(length(min = 1, max = 3))]
    pub brochure_ids: Vec<Uuid>,
    pub guarantor_id: Uuid,
}

/// Request DTO for a guarantor's answer
#[derive(Debug, Deserialize)]
pub struct RespondGuarantorRequest {
    pub status: GuarantorResponse,
}
