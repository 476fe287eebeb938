//! In-process store used by tests and local runs
//!
//! Contracts live in a `DashMap`; a mutation holds the entry's write guard
//! while the closure runs, which serializes writers per contract id. Request
//! pairs sit behind one mutex so the one-active-request check and the insert
//! happen under the same lock.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    contract_not_found, request_not_found, ContractMutation, ContractOpening, LendingStore,
    RequestMutation,
};
use crate::contract::{ContractLedger, ContractStatus};
use crate::error::{LendingError, LendingResult};
use crate::loan_request::{
    GuarantorRequest, GuarantorRequestStatus, LoanRequest, LoanRequestStatus, RequestRecord,
};
use crate::models::{LoanBrochure, User};
use crate::services::{TrustIndexUpdater, TrustReason};

/// One applied trust delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustHistoryEntry {
    pub user_id: Uuid,
    pub delta: i32,
    pub new_trust_index: i32,
    pub reason: TrustReason,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    brochures: DashMap<Uuid, LoanBrochure>,
    requests: Mutex<HashMap<Uuid, RequestRecord>>,
    contracts: DashMap<Uuid, ContractLedger>,
    trust_history: Mutex<Vec<TrustHistoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_brochure(&self, brochure: LoanBrochure) {
        self.brochures.insert(brochure.id, brochure);
    }

    /// Seed a contract directly, bypassing the request workflow
    pub fn insert_contract(&self, ledger: ContractLedger) {
        self.contracts.insert(ledger.contract.id, ledger);
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn trust_history(&self) -> Vec<TrustHistoryEntry> {
        self.trust_history.lock().clone()
    }

    fn apply_contract_mutation(
        &self,
        contract_id: Uuid,
        mutation: ContractMutation<'_>,
    ) -> LendingResult<()> {
        let mut entry = self
            .contracts
            .get_mut(&contract_id)
            .ok_or_else(|| contract_not_found(contract_id))?;
        let mut working = entry.clone();
        mutation(&mut working)?;
        *entry = working;
        Ok(())
    }

    fn apply_request_mutation(
        &self,
        loan_request_id: Uuid,
        mutation: RequestMutation<'_>,
    ) -> LendingResult<()> {
        let mut requests = self.requests.lock();
        let record = requests
            .get_mut(&loan_request_id)
            .ok_or_else(|| request_not_found(loan_request_id))?;
        let mut working = record.clone();
        mutation(&mut working)?;
        *record = working;
        Ok(())
    }

    fn apply_contract_opening(
        &self,
        loan_request_id: Uuid,
        opening: ContractOpening<'_>,
    ) -> LendingResult<ContractLedger> {
        let mut requests = self.requests.lock();
        let record = requests
            .get_mut(&loan_request_id)
            .ok_or_else(|| request_not_found(loan_request_id))?;
        let mut working = record.clone();
        let ledger = opening(&mut working)?;
        if self.contracts.contains_key(&ledger.contract.id) {
            return Err(LendingError::conflict("Contract already exists"));
        }
        self.contracts.insert(ledger.contract.id, ledger.clone());
        *record = working;
        Ok(ledger)
    }
}

#[async_trait]
impl TrustIndexUpdater for MemoryStore {
    async fn apply_delta(&self, user_id: Uuid, delta: i32, reason: TrustReason) -> LendingResult<()> {
        let new_trust_index = {
            let mut user = self
                .users
                .get_mut(&user_id)
                .ok_or_else(|| LendingError::not_found(format!("User {} not found", user_id)))?;
            user.trust_index += delta;
            user.trust_index
        };
        self.trust_history.lock().push(TrustHistoryEntry {
            user_id,
            delta,
            new_trust_index,
            reason,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl LendingStore for MemoryStore {
    async fn health_check(&self) -> LendingResult<()> {
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> LendingResult<Option<User>> {
        Ok(self.user(id))
    }

    async fn get_brochures(&self, ids: &[Uuid]) -> LendingResult<Vec<LoanBrochure>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.brochures.get(id).map(|b| b.clone()))
            .collect())
    }

    async fn has_active_request(&self, receiver_id: Uuid) -> LendingResult<bool> {
        Ok(self.requests.lock().values().any(|r| {
            r.loan_request.receiver_id == receiver_id && r.loan_request.status.is_active()
        }))
    }

    async fn insert_request(&self, record: &RequestRecord) -> LendingResult<()> {
        let mut requests = self.requests.lock();
        let receiver_id = record.loan_request.receiver_id;
        if requests.values().any(|r| {
            r.loan_request.receiver_id == receiver_id && r.loan_request.status.is_active()
        }) {
            return Err(LendingError::conflict(
                "You already have an active loan request.",
            ));
        }
        requests.insert(record.loan_request.id, record.clone());
        Ok(())
    }

    async fn get_request(&self, loan_request_id: Uuid) -> LendingResult<Option<RequestRecord>> {
        Ok(self.requests.lock().get(&loan_request_id).cloned())
    }

    async fn find_request_by_guarantor_request(
        &self,
        guarantor_request_id: Uuid,
    ) -> LendingResult<Option<RequestRecord>> {
        Ok(self
            .requests
            .lock()
            .values()
            .find(|r| r.guarantor_request.id == guarantor_request_id)
            .cloned())
    }

    async fn list_requests_for_receiver(
        &self,
        receiver_id: Uuid,
    ) -> LendingResult<Vec<LoanRequest>> {
        let mut requests: Vec<LoanRequest> = self
            .requests
            .lock()
            .values()
            .filter(|r| r.loan_request.receiver_id == receiver_id)
            .map(|r| r.loan_request.clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn list_requests_for_lender(&self, lender_id: Uuid) -> LendingResult<Vec<LoanRequest>> {
        let owned: HashSet<Uuid> = self
            .brochures
            .iter()
            .filter(|b| b.lender_id == lender_id)
            .map(|b| *b.key())
            .collect();

        let mut requests: Vec<LoanRequest> = self
            .requests
            .lock()
            .values()
            .filter(|r| {
                r.loan_request.status == LoanRequestStatus::GuarantorAccepted
                    && r.loan_request.brochure_ids.iter().any(|id| owned.contains(id))
            })
            .map(|r| r.loan_request.clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn list_pending_guarantor_requests(
        &self,
        guarantor_id: Uuid,
    ) -> LendingResult<Vec<GuarantorRequest>> {
        let mut pending: Vec<GuarantorRequest> = self
            .requests
            .lock()
            .values()
            .filter(|r| {
                r.guarantor_request.guarantor_id == guarantor_id
                    && r.guarantor_request.status == GuarantorRequestStatus::Pending
            })
            .map(|r| r.guarantor_request.clone())
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }

    async fn mutate_request<'a>(
        &self,
        loan_request_id: Uuid,
        mutation: RequestMutation<'a>,
    ) -> LendingResult<()> {
        self.apply_request_mutation(loan_request_id, mutation)
    }

    async fn open_contract<'a>(
        &self,
        loan_request_id: Uuid,
        opening: ContractOpening<'a>,
    ) -> LendingResult<ContractLedger> {
        self.apply_contract_opening(loan_request_id, opening)
    }

    async fn get_contract(&self, contract_id: Uuid) -> LendingResult<Option<ContractLedger>> {
        Ok(self.contracts.get(&contract_id).map(|c| c.clone()))
    }

    async fn mutate_contract<'a>(
        &self,
        contract_id: Uuid,
        mutation: ContractMutation<'a>,
    ) -> LendingResult<()> {
        self.apply_contract_mutation(contract_id, mutation)
    }

    async fn list_contract_ids_by_status(
        &self,
        status: ContractStatus,
    ) -> LendingResult<Vec<Uuid>> {
        Ok(self
            .contracts
            .iter()
            .filter(|entry| entry.contract.status == status)
            .map(|entry| *entry.key())
            .collect())
    }
}
