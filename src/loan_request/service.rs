//! Loan request service layer - request creation, guarantor answers and
//! cancellation

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use super::model::{
    CreateLoanRequest, GuarantorRequest, GuarantorResponse, LoanRequest, RequestRecord,
};
use crate::error::{LendingError, LendingResult};
use crate::models::{Actor, UserRole};
use crate::services::{validate_guarantor_nomination, validate_request_creation};
use crate::store::{request_not_found, with_request, LendingStore};

pub struct LoanRequestService {
    store: Arc<dyn LendingStore>,
}

impl LoanRequestService {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        Self { store }
    }

    /// Create a loan request together with its guarantor request
    pub async fn create(
        &self,
        actor: Actor,
        request: CreateLoanRequest,
    ) -> LendingResult<RequestRecord> {
        actor.require_role(UserRole::Receiver)?;
        request.validate()?;

        let receiver = self
            .store
            .get_user(actor.user_id)
            .await?
            .ok_or_else(|| LendingError::not_found(format!("User {} not found", actor.user_id)))?;

        let brochures = self.store.get_brochures(&request.brochure_ids).await?;
        let has_active_request = self.store.has_active_request(receiver.id).await?;

        validate_request_creation(
            &actor,
            &receiver,
            &request.brochure_ids,
            &brochures,
            has_active_request,
        )?;
        validate_guarantor_nomination(&receiver, request.guarantor_id)?;

        if self.store.get_user(request.guarantor_id).await?.is_none() {
            return Err(LendingError::not_found(format!(
                "Guarantor {} not found",
                request.guarantor_id
            )));
        }

        let record = RequestRecord::new(receiver.id, request.brochure_ids, request.guarantor_id);
        self.store.insert_request(&record).await?;

        tracing::info!(
            loan_request_id = %record.loan_request.id,
            guarantor_request_id = %record.guarantor_request.id,
            receiver_id = %receiver.id,
            guarantor_id = %request.guarantor_id,
            "Loan request created"
        );
        Ok(record)
    }

    pub async fn cancel(&self, actor: Actor, loan_request_id: Uuid) -> LendingResult<LoanRequest> {
        actor.require_role(UserRole::Receiver)?;
        let request = with_request(self.store.as_ref(), loan_request_id, |record| {
            record.cancel(actor.user_id)?;
            Ok(record.loan_request.clone())
        })
        .await?;

        tracing::info!(loan_request_id = %loan_request_id, "Loan request cancelled");
        Ok(request)
    }

    pub async fn list_mine(&self, actor: Actor) -> LendingResult<Vec<LoanRequest>> {
        actor.require_role(UserRole::Receiver)?;
        self.store.list_requests_for_receiver(actor.user_id).await
    }

    /// Requests a lender can turn into a contract
    pub async fn list_for_lender(&self, actor: Actor) -> LendingResult<Vec<LoanRequest>> {
        actor.require_role(UserRole::Lender)?;
        self.store.list_requests_for_lender(actor.user_id).await
    }

    /// Guarantor's one-shot answer
    pub async fn respond(
        &self,
        actor: Actor,
        guarantor_request_id: Uuid,
        response: GuarantorResponse,
    ) -> LendingResult<GuarantorRequest> {
        actor.require_role(UserRole::Guarantor)?;
        let record = self.find_by_guarantor_request(guarantor_request_id).await?;
        if record.guarantor_request.guarantor_id != actor.user_id {
            return Err(LendingError::role(
                "Only the nominated guarantor can respond to this request",
            ));
        }

        let loan_request_id = record.loan_request.id;
        let answered = with_request(self.store.as_ref(), loan_request_id, |record| {
            record.respond(response)?;
            Ok(record.guarantor_request.clone())
        })
        .await?;

        tracing::info!(
            guarantor_request_id = %guarantor_request_id,
            loan_request_id = %loan_request_id,
            response = ?response,
            "Guarantor responded"
        );
        Ok(answered)
    }

    pub async fn list_pending(&self, actor: Actor) -> LendingResult<Vec<GuarantorRequest>> {
        actor.require_role(UserRole::Guarantor)?;
        self.store
            .list_pending_guarantor_requests(actor.user_id)
            .await
    }

    /// Visible to the nominated guarantor and the receiver who asked
    pub async fn get_guarantor_request(
        &self,
        actor: Actor,
        guarantor_request_id: Uuid,
    ) -> LendingResult<GuarantorRequest> {
        let record = self.find_by_guarantor_request(guarantor_request_id).await?;
        let request = record.guarantor_request;
        if actor.user_id != request.guarantor_id && actor.user_id != request.receiver_id {
            return Err(LendingError::role(
                "You are not allowed to view this guarantor request",
            ));
        }
        Ok(request)
    }

    /// Visible to the receiver, the guarantor and any lender whose brochure
    /// the request applies to
    pub async fn get_loan_request(
        &self,
        actor: Actor,
        loan_request_id: Uuid,
    ) -> LendingResult<LoanRequest> {
        let record = self
            .store
            .get_request(loan_request_id)
            .await?
            .ok_or_else(|| request_not_found(loan_request_id))?;
        let request = record.loan_request;
        if actor.user_id == request.receiver_id || actor.user_id == request.guarantor_id {
            return Ok(request);
        }

        let brochures = self.store.get_brochures(&request.brochure_ids).await?;
        if brochures.iter().any(|b| b.lender_id == actor.user_id) {
            return Ok(request);
        }
        Err(LendingError::role(
            "You are not allowed to view this loan request",
        ))
    }

    async fn find_by_guarantor_request(
        &self,
        guarantor_request_id: Uuid,
    ) -> LendingResult<RequestRecord> {
        self.store
            .find_request_by_guarantor_request(guarantor_request_id)
            .await?
            .ok_or_else(|| {
                LendingError::not_found(format!(
                    "Guarantor request {} not found",
                    guarantor_request_id
                ))
            })
    }
}
