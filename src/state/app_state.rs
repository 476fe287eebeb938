//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::contract::ContractService;
use crate::loan_request::LoanRequestService;
use crate::payment::{CallbackVerifier, ReconciliationEngine};
use crate::store::LendingStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LendingStore>,
    pub loan_request_service: Arc<LoanRequestService>,
    pub contract_service: Arc<ContractService>,
    pub reconciliation_engine: Arc<ReconciliationEngine>,
    pub callback_verifier: Arc<dyn CallbackVerifier>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LendingStore>,
        loan_request_service: Arc<LoanRequestService>,
        contract_service: Arc<ContractService>,
        reconciliation_engine: Arc<ReconciliationEngine>,
        callback_verifier: Arc<dyn CallbackVerifier>,
    ) -> Self {
        Self {
            store,
            loan_request_service,
            contract_service,
            reconciliation_engine,
            callback_verifier,
        }
    }
}

impl FromRef<AppState> for Arc<dyn LendingStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Arc<LoanRequestService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_request_service.clone()
    }
}

impl FromRef<AppState> for Arc<ContractService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.contract_service.clone()
    }
}

impl FromRef<AppState> for Arc<ReconciliationEngine> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reconciliation_engine.clone()
    }
}

impl FromRef<AppState> for Arc<dyn CallbackVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.callback_verifier.clone()
    }
}
