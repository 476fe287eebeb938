//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use trustlend_server::contract::{Contract, ContractService, ContractStatus, CreateContractRequest};
use trustlend_server::loan_request::{
    CreateLoanRequest, GuarantorResponse, LoanRequestService, RequestRecord,
};
use trustlend_server::models::{Actor, LoanBrochure, User};
use trustlend_server::payment::{
    AcceptAllVerifier, CallbackVerifier, PaymentEvent, PaymentType, ReconciliationEngine,
    SimulatedGateway,
};
use trustlend_server::state::AppState;
use trustlend_server::store::{LendingStore, MemoryStore};

pub const RECEIVER_TRUST_INDEX: i32 = 450;
pub const GUARANTOR_TRUST_INDEX: i32 = 700;

/// An in-memory world with one receiver, one guarantor who endorsed them, and
/// one lender with a 10 000 / 10% / 90 day brochure
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub requests: Arc<LoanRequestService>,
    pub contracts: Arc<ContractService>,
    pub engine: Arc<ReconciliationEngine>,
    pub receiver: User,
    pub guarantor: User,
    pub lender: User,
    pub brochure: LoanBrochure,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());

        let guarantor = User::new("Guarantor", GUARANTOR_TRUST_INDEX);
        let receiver =
            User::new("Receiver", RECEIVER_TRUST_INDEX).with_endorsement_from(guarantor.id);
        let lender = User::new("Lender", 800);
        let brochure = LoanBrochure::new(lender.id, 10_000, 1_000, 90);

        store.insert_user(guarantor.clone());
        store.insert_user(receiver.clone());
        store.insert_user(lender.clone());
        store.insert_brochure(brochure.clone());

        let dyn_store: Arc<dyn LendingStore> = store.clone();
        let requests = Arc::new(LoanRequestService::new(dyn_store.clone()));
        let contracts = Arc::new(ContractService::new(
            dyn_store.clone(),
            Arc::new(SimulatedGateway::new("http://localhost:5174".to_string())),
            Duration::days(30),
        ));
        let engine = Arc::new(ReconciliationEngine::new(dyn_store));

        Self {
            store,
            requests,
            contracts,
            engine,
            receiver,
            guarantor,
            lender,
            brochure,
        }
    }

    pub fn receiver_actor(&self) -> Actor {
        Actor::receiver(self.receiver.id)
    }

    pub fn lender_actor(&self) -> Actor {
        Actor::lender(self.lender.id)
    }

    pub fn guarantor_actor(&self) -> Actor {
        Actor::guarantor(self.guarantor.id)
    }

    pub fn app_state(&self, verifier: Arc<dyn CallbackVerifier>) -> AppState {
        AppState::new(
            self.store.clone(),
            self.requests.clone(),
            self.contracts.clone(),
            self.engine.clone(),
            verifier,
        )
    }

    pub fn open_app_state(&self) -> AppState {
        self.app_state(Arc::new(AcceptAllVerifier))
    }

    pub fn add_brochure(&self, amount: i64) -> LoanBrochure {
        let brochure = LoanBrochure::new(self.lender.id, amount, 1_000, 90);
        self.store.insert_brochure(brochure.clone());
        brochure
    }

    pub fn request_body(&self, brochure_ids: Vec<Uuid>) -> CreateLoanRequest {
        CreateLoanRequest {
            brochure_ids,
            guarantor_id: self.guarantor.id,
        }
    }

    pub async fn open_request(&self) -> RequestRecord {
        self.requests
            .create(self.receiver_actor(), self.request_body(vec![self.brochure.id]))
            .await
            .unwrap()
    }

    pub async fn guaranteed_request(&self) -> RequestRecord {
        let record = self.open_request().await;
        self.requests
            .respond(
                self.guarantor_actor(),
                record.guarantor_request.id,
                GuarantorResponse::Accepted,
            )
            .await
            .unwrap();
        record
    }

    pub async fn drafted_contract(&self) -> Contract {
        let record = self.guaranteed_request().await;
        self.contracts
            .create_from_request(
                self.lender_actor(),
                CreateContractRequest {
                    loan_request_id: record.loan_request.id,
                    brochure_id: self.brochure.id,
                },
            )
            .await
            .unwrap()
    }

    pub async fn signed_contract(&self) -> Contract {
        let contract = self.drafted_contract().await;
        self.contracts
            .sign(self.lender_actor(), contract.id)
            .await
            .unwrap();
        let contract = self
            .contracts
            .sign(self.receiver_actor(), contract.id)
            .await
            .unwrap();
        assert_eq!(contract.status, ContractStatus::AwaitingDisbursal);
        contract
    }

    pub async fn active_contract(&self) -> Contract {
        let contract = self.signed_contract().await;
        self.engine
            .handle_event(&disbursal_completed(contract.id))
            .await
            .unwrap();
        self.contracts
            .confirm_receipt(self.receiver_actor(), contract.id)
            .await
            .unwrap()
    }
}

pub fn disbursal_completed(contract_id: Uuid) -> PaymentEvent {
    PaymentEvent::completed(
        contract_id,
        PaymentType::Disbursal,
        &format!("DISBURSAL_{}_0000abcd", contract_id),
    )
}

pub fn emi_completed(contract_id: Uuid, suffix: &str) -> PaymentEvent {
    PaymentEvent::completed(
        contract_id,
        PaymentType::Emi,
        &format!("EMI_{}_{}", contract_id, suffix),
    )
}
