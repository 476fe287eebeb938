//! Persistence boundary for the lending core
//!
//! Each aggregate is changed through a unit of work: the store loads the
//! aggregate under a per-key lock (or row lock), runs a synchronous closure over
//! a working copy, and commits only when the closure returns `Ok`. Two writers
//! on the same contract or request therefore never interleave, and a failed
//! operation leaves nothing behind.

mod memory;
mod postgres;

pub use memory::{MemoryStore, TrustHistoryEntry};
pub use postgres::{DbError, PgStore};

use async_trait::async_trait;
use uuid::Uuid;

use crate::contract::{ContractLedger, ContractStatus};
use crate::error::{LendingError, LendingResult};
use crate::loan_request::{GuarantorRequest, LoanRequest, RequestRecord};
use crate::models::{LoanBrochure, User};
use crate::services::TrustIndexUpdater;

pub type ContractMutation<'a> =
    Box<dyn FnOnce(&mut ContractLedger) -> LendingResult<()> + Send + 'a>;

pub type RequestMutation<'a> = Box<dyn FnOnce(&mut RequestRecord) -> LendingResult<()> + Send + 'a>;

/// Advances a request and drafts the contract that supersedes it
pub type ContractOpening<'a> =
    Box<dyn FnOnce(&mut RequestRecord) -> LendingResult<ContractLedger> + Send + 'a>;

#[async_trait]
pub trait LendingStore: TrustIndexUpdater + Send + Sync {
    async fn health_check(&self) -> LendingResult<()>;

    async fn get_user(&self, id: Uuid) -> LendingResult<Option<User>>;

    /// Resolve the brochures that exist among `ids`; unknown ids are skipped
    async fn get_brochures(&self, ids: &[Uuid]) -> LendingResult<Vec<LoanBrochure>>;

    async fn has_active_request(&self, receiver_id: Uuid) -> LendingResult<bool>;

    /// Insert a request pair. Fails with `Conflict` when the receiver already
    /// holds an active request, checked atomically with the insert.
    async fn insert_request(&self, record: &RequestRecord) -> LendingResult<()>;

    async fn get_request(&self, loan_request_id: Uuid) -> LendingResult<Option<RequestRecord>>;

    async fn find_request_by_guarantor_request(
        &self,
        guarantor_request_id: Uuid,
    ) -> LendingResult<Option<RequestRecord>>;

    async fn list_requests_for_receiver(&self, receiver_id: Uuid)
        -> LendingResult<Vec<LoanRequest>>;

    /// Guaranteed requests that list at least one of the lender's brochures,
    /// newest first
    async fn list_requests_for_lender(&self, lender_id: Uuid) -> LendingResult<Vec<LoanRequest>>;

    async fn list_pending_guarantor_requests(
        &self,
        guarantor_id: Uuid,
    ) -> LendingResult<Vec<GuarantorRequest>>;

    async fn mutate_request<'a>(
        &self,
        loan_request_id: Uuid,
        mutation: RequestMutation<'a>,
    ) -> LendingResult<()>;

    /// Run `opening` over the request and persist both the request change and
    /// the returned contract in one commit
    async fn open_contract<'a>(
        &self,
        loan_request_id: Uuid,
        opening: ContractOpening<'a>,
    ) -> LendingResult<ContractLedger>;

    async fn get_contract(&self, contract_id: Uuid) -> LendingResult<Option<ContractLedger>>;

    async fn mutate_contract<'a>(
        &self,
        contract_id: Uuid,
        mutation: ContractMutation<'a>,
    ) -> LendingResult<()>;

    async fn list_contract_ids_by_status(&self, status: ContractStatus)
        -> LendingResult<Vec<Uuid>>;
}

/// Typed wrapper over [`LendingStore::mutate_contract`]
pub async fn with_contract<T, F>(
    store: &dyn LendingStore,
    contract_id: Uuid,
    f: F,
) -> LendingResult<T>
where
    T: Send,
    F: FnOnce(&mut ContractLedger) -> LendingResult<T> + Send,
{
    let mut output = None;
    store
        .mutate_contract(
            contract_id,
            Box::new(|ledger: &mut ContractLedger| {
                output = Some(f(ledger)?);
                Ok(())
            }),
        )
        .await?;
    output.ok_or_else(|| LendingError::Database("contract mutation produced no result".to_string()))
}

/// Typed wrapper over [`LendingStore::mutate_request`]
pub async fn with_request<T, F>(
    store: &dyn LendingStore,
    loan_request_id: Uuid,
    f: F,
) -> LendingResult<T>
where
    T: Send,
    F: FnOnce(&mut RequestRecord) -> LendingResult<T> + Send,
{
    let mut output = None;
    store
        .mutate_request(
            loan_request_id,
            Box::new(|record: &mut RequestRecord| {
                output = Some(f(record)?);
                Ok(())
            }),
        )
        .await?;
    output.ok_or_else(|| LendingError::Database("request mutation produced no result".to_string()))
}

pub(crate) fn contract_not_found(contract_id: Uuid) -> LendingError {
    LendingError::not_found(format!("Contract {} not found", contract_id))
}

pub(crate) fn request_not_found(loan_request_id: Uuid) -> LendingError {
    LendingError::not_found(format!("Loan request {} not found", loan_request_id))
}
