//! Contract service layer - signing, payments and lifecycle

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::model::{Contract, ContractLedger, ContractStatus, CreateContractRequest};
use super::schedule::{generate_schedule, ScheduleView};
use crate::error::{LendingError, LendingResult};
use crate::loan_request::{LoanRequestStatus, RequestRecord};
use crate::models::{Actor, UserRole};
use crate::payment::{CheckoutOrder, PaymentGateway, PaymentRedirect, PaymentType, Transaction};
use crate::services::apply_trust_deltas;
use crate::store::{contract_not_found, with_contract, with_request, LendingStore};

/// Contract service for managing the contract lifecycle
pub struct ContractService {
    store: Arc<dyn LendingStore>,
    gateway: Arc<dyn PaymentGateway>,
    grace_period: Duration,
}

impl ContractService {
    pub fn new(
        store: Arc<dyn LendingStore>,
        gateway: Arc<dyn PaymentGateway>,
        grace_period: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            grace_period,
        }
    }

    /// Lender accepts a guaranteed request by picking one of its brochures
    pub async fn create_from_request(
        &self,
        actor: Actor,
        request: CreateContractRequest,
    ) -> LendingResult<Contract> {
        actor.require_role(UserRole::Lender)?;

        let brochure = self
            .store
            .get_brochures(&[request.brochure_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                LendingError::not_found(format!("Brochure {} not found", request.brochure_id))
            })?;
        if brochure.lender_id != actor.user_id {
            return Err(LendingError::role(
                "Only the lender who published the brochure can accept on it",
            ));
        }
        if !brochure.active {
            return Err(LendingError::validation("Brochure is no longer active"));
        }

        let now = Utc::now();
        let brochure_id = brochure.id;
        let ledger = self
            .store
            .open_contract(
                request.loan_request_id,
                Box::new(move |record: &mut RequestRecord| {
                    if !record.loan_request.brochure_ids.contains(&brochure_id) {
                        return Err(LendingError::validation(
                            "Brochure is not part of this loan request",
                        ));
                    }
                    record.advance(
                        LoanRequestStatus::GuarantorAccepted,
                        LoanRequestStatus::Contracting,
                    )?;

                    let mut contract = Contract::draft(
                        record.loan_request.id,
                        record.loan_request.receiver_id,
                        record.loan_request.guarantor_id,
                        &brochure,
                        now,
                    );
                    contract.transition(ContractStatus::PendingSignatures, now)?;
                    Ok(ContractLedger::new(contract))
                }),
            )
            .await?;

        tracing::info!(
            contract_id = %ledger.contract.id,
            loan_request_id = %request.loan_request_id,
            lender_id = %actor.user_id,
            "Contract created"
        );
        Ok(ledger.contract)
    }

    pub async fn get(&self, actor: Actor, contract_id: Uuid) -> LendingResult<Contract> {
        Ok(self.load_for_party(actor, contract_id).await?.contract)
    }

    /// Sign for the actor's side. Re-signing returns the contract unchanged.
    pub async fn sign(&self, actor: Actor, contract_id: Uuid) -> LendingResult<Contract> {
        let now = Utc::now();
        let (completed, contract) =
            with_contract(self.store.as_ref(), contract_id, |ledger| {
                let completed = ledger.contract.sign(&actor, now)?;
                Ok((completed, ledger.contract.clone()))
            })
            .await?;

        tracing::info!(
            contract_id = %contract_id,
            user_id = %actor.user_id,
            role = actor.role.as_str(),
            status = ?contract.status,
            "Contract signed"
        );

        if completed {
            self.close_request(contract.loan_request_id).await;
        }
        Ok(contract)
    }

    /// Mark the originating request as contracted once both parties signed
    async fn close_request(&self, loan_request_id: Uuid) {
        let result = with_request(self.store.as_ref(), loan_request_id, |record| {
            if record.loan_request.status == LoanRequestStatus::Contracted {
                return Ok(());
            }
            record.advance(LoanRequestStatus::Contracting, LoanRequestStatus::Contracted)
        })
        .await;

        if let Err(e) = result {
            tracing::error!(
                loan_request_id = %loan_request_id,
                error = %e,
                "Failed to close loan request after signing"
            );
        }
    }

    /// Lender starts the disbursal checkout
    pub async fn initiate_disbursal_payment(
        &self,
        actor: Actor,
        contract_id: Uuid,
    ) -> LendingResult<PaymentRedirect> {
        actor.require_role(UserRole::Lender)?;
        let contract = self.load(contract_id).await?.contract;
        if contract.lender_id != actor.user_id {
            return Err(LendingError::role(
                "Only the contract's lender can disburse funds",
            ));
        }
        if contract.status != ContractStatus::AwaitingDisbursal {
            return Err(LendingError::state(format!(
                "Disbursal can only be initiated while awaiting disbursal (contract is {:?})",
                contract.status
            )));
        }

        let order = CheckoutOrder::new(
            contract.id,
            actor.user_id,
            PaymentType::Disbursal,
            contract.principal,
            None,
        );
        self.checkout(order).await
    }

    /// Receiver starts the checkout for the next unpaid installment
    pub async fn initiate_emi_payment(
        &self,
        actor: Actor,
        contract_id: Uuid,
    ) -> LendingResult<PaymentRedirect> {
        actor.require_role(UserRole::Receiver)?;
        let ledger = self.load(contract_id).await?;
        if ledger.contract.receiver_id != actor.user_id {
            return Err(LendingError::role(
                "Only the contract's receiver can pay installments",
            ));
        }
        if ledger.contract.status != ContractStatus::Active {
            return Err(LendingError::state(format!(
                "Installments can only be paid on an active contract (contract is {:?})",
                ledger.contract.status
            )));
        }
        let emi = ledger
            .next_unpaid()
            .ok_or_else(|| LendingError::state("All installments are already paid"))?;

        let order = CheckoutOrder::new(
            contract_id,
            actor.user_id,
            PaymentType::Emi,
            emi.total(),
            Some(emi.emi_number),
        );
        self.checkout(order).await
    }

    async fn checkout(&self, order: CheckoutOrder) -> LendingResult<PaymentRedirect> {
        let redirect_url = self.gateway.create_checkout(&order).await?;
        tracing::info!(
            contract_id = %order.contract_id,
            merchant_order_id = %order.merchant_order_id,
            payment_type = order.payment_type.as_str(),
            amount = order.amount,
            "Payment initiated"
        );
        Ok(PaymentRedirect {
            merchant_order_id: order.merchant_order_id,
            redirect_url,
            amount: order.amount,
            payment_type: order.payment_type,
        })
    }

    /// Receiver confirms the funds arrived; activates the contract
    pub async fn confirm_receipt(&self, actor: Actor, contract_id: Uuid) -> LendingResult<Contract> {
        let now = Utc::now();
        let contract = with_contract(self.store.as_ref(), contract_id, |ledger| {
            ledger.confirm_receipt(&actor, now)?;
            Ok(ledger.contract.clone())
        })
        .await?;

        tracing::info!(
            contract_id = %contract_id,
            end_date = %contract.end_date,
            "Receipt confirmed, contract active"
        );
        Ok(contract)
    }

    /// Installment view. Before activation this is the projected plan.
    pub async fn emi_schedule(&self, actor: Actor, contract_id: Uuid) -> LendingResult<ScheduleView> {
        let ledger = self.load_for_party(actor, contract_id).await?;
        let now = Utc::now();
        if ledger.installments.is_empty() {
            let projected = generate_schedule(
                ledger.contract.id,
                ledger.contract.schedule_terms(),
                ledger.contract.start_date,
            )?;
            return Ok(ScheduleView::build(&projected, now));
        }
        Ok(ScheduleView::build(&ledger.installments, now))
    }

    /// Ledger entries, newest first
    pub async fn payment_history(
        &self,
        actor: Actor,
        contract_id: Uuid,
    ) -> LendingResult<Vec<Transaction>> {
        let mut transactions = self.load_for_party(actor, contract_id).await?.transactions;
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions)
    }

    /// Default every active contract past the grace period. Returns the ids
    /// that moved to DEFAULTED.
    pub async fn sweep_defaults(&self, now: DateTime<Utc>) -> LendingResult<Vec<Uuid>> {
        let active = self
            .store
            .list_contract_ids_by_status(ContractStatus::Active)
            .await?;

        let mut defaulted = Vec::new();
        for contract_id in active {
            let grace = self.grace_period;
            let result = with_contract(self.store.as_ref(), contract_id, |ledger| {
                ledger.default_if_delinquent(now, grace)
            })
            .await;

            match result {
                Ok(deltas) if deltas.is_empty() => {}
                Ok(deltas) => {
                    tracing::warn!(contract_id = %contract_id, "Contract defaulted");
                    apply_trust_deltas(self.store.as_ref(), &deltas).await;
                    defaulted.push(contract_id);
                }
                Err(e) => {
                    tracing::error!(
                        contract_id = %contract_id,
                        error = %e,
                        "Failed to evaluate contract for default"
                    );
                }
            }
        }
        Ok(defaulted)
    }

    async fn load(&self, contract_id: Uuid) -> LendingResult<ContractLedger> {
        self.store
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| contract_not_found(contract_id))
    }

    async fn load_for_party(&self, actor: Actor, contract_id: Uuid) -> LendingResult<ContractLedger> {
        let ledger = self.load(contract_id).await?;
        if !ledger.contract.is_party(actor.user_id) {
            return Err(LendingError::role("You are not a party to this contract"));
        }
        Ok(ledger)
    }
}

/// Background task that periodically defaults delinquent contracts
pub async fn delinquency_sweeper(service: Arc<ContractService>, interval: std::time::Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting delinquency sweeper");

    loop {
        tokio::time::sleep(interval).await;

        match service.sweep_defaults(Utc::now()).await {
            Ok(defaulted) if !defaulted.is_empty() => {
                tracing::info!(count = defaulted.len(), "Delinquency sweep defaulted contracts");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Error sweeping delinquent contracts: {}", e);
            }
        }
    }
}
