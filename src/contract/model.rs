//! Contract models and the contract state machine

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schedule::{
    default_installment_count, generate_schedule, total_repayable, EmiInstallment, EmiStatus,
    ScheduleTerms,
};
use crate::error::{LendingError, LendingResult};
use crate::models::{Actor, LoanBrochure, UserRole};
use crate::payment::{Transaction, TransactionStatus};
use crate::services::trust_index::{
    TrustDelta, TrustReason, DEFAULT_GUARANTOR_DELTA, DEFAULT_RECEIVER_DELTA,
};

/// Contract lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "contract_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Created,
    PendingSignatures,
    AwaitingDisbursal,
    AwaitingReceiptConfirmation,
    Active,
    Completed,
    Defaulted,
}

impl ContractStatus {
    /// The transition table. Every status change goes through here.
    pub fn allowed_targets(&self) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match self {
            Created => &[PendingSignatures],
            PendingSignatures => &[AwaitingDisbursal],
            AwaitingDisbursal => &[AwaitingReceiptConfirmation],
            AwaitingReceiptConfirmation => &[Active],
            Active => &[Completed, Defaulted],
            Completed | Defaulted => &[],
        }
    }

    pub fn can_transition_to(&self, next: ContractStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Position along the lifecycle, used to tell stale events from early ones.
    /// The two terminal states share a stage.
    pub fn stage(&self) -> u8 {
        use ContractStatus::*;
        match self {
            Created => 0,
            PendingSignatures => 1,
            AwaitingDisbursal => 2,
            AwaitingReceiptConfirmation => 3,
            Active => 4,
            Completed | Defaulted => 5,
        }
    }
}

/// Contract model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Contract {
    pub id: Uuid,
    pub loan_request_id: Uuid,
    pub brochure_id: Uuid,
    pub receiver_id: Uuid,
    pub lender_id: Uuid,
    pub guarantor_id: Uuid,
    pub principal: i64,
    pub interest_rate_bps: i32,
    pub tenor_days: i32,
    pub installment_count: i32,
    pub total_repayable: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ContractStatus,
    pub receiver_signed: bool,
    pub lender_signed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Draft a contract from the brochure the lender accepted
    pub fn draft(
        loan_request_id: Uuid,
        receiver_id: Uuid,
        guarantor_id: Uuid,
        brochure: &LoanBrochure,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_request_id,
            brochure_id: brochure.id,
            receiver_id,
            lender_id: brochure.lender_id,
            guarantor_id,
            principal: brochure.amount,
            interest_rate_bps: brochure.interest_rate_bps,
            tenor_days: brochure.tenor_days,
            installment_count: default_installment_count(brochure.tenor_days),
            total_repayable: total_repayable(brochure.amount, brochure.interest_rate_bps),
            start_date: now,
            end_date: now + Duration::days(brochure.tenor_days as i64),
            status: ContractStatus::Created,
            receiver_signed: false,
            lender_signed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn schedule_terms(&self) -> ScheduleTerms {
        ScheduleTerms {
            principal: self.principal,
            interest_rate_bps: self.interest_rate_bps,
            tenor_days: self.tenor_days,
            installment_count: self.installment_count,
        }
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.receiver_id == user_id || self.lender_id == user_id || self.guarantor_id == user_id
    }

    /// Apply one transition from the table; no mutation on failure
    pub fn transition(&mut self, next: ContractStatus, now: DateTime<Utc>) -> LendingResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::state(format!(
                "Contract {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        tracing::debug!(
            contract_id = %self.id,
            from = ?self.status,
            to = ?next,
            "Contract status transition"
        );
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Set the signing flag for the actor's side. Returns true when this
    /// signature completed the pair.
    pub fn sign(&mut self, actor: &Actor, now: DateTime<Utc>) -> LendingResult<bool> {
        let already_signed = match actor.role {
            UserRole::Receiver if actor.user_id == self.receiver_id => self.receiver_signed,
            UserRole::Lender if actor.user_id == self.lender_id => self.lender_signed,
            _ => {
                return Err(LendingError::role(
                    "Only the contract's receiver or lender, acting in that role, can sign",
                ))
            }
        };

        if already_signed {
            return Ok(false);
        }

        if self.status == ContractStatus::Created {
            self.transition(ContractStatus::PendingSignatures, now)?;
        }
        if self.status != ContractStatus::PendingSignatures {
            return Err(LendingError::state(format!(
                "Contract is {:?} and can no longer be signed",
                self.status
            )));
        }

        match actor.role {
            UserRole::Receiver => self.receiver_signed = true,
            _ => self.lender_signed = true,
        }
        self.updated_at = now;

        if self.receiver_signed && self.lender_signed {
            self.transition(ContractStatus::AwaitingDisbursal, now)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// A contract with its installments and ledger: the unit every contract
/// mutation loads, changes and commits as a whole.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContractLedger {
    pub contract: Contract,
    pub installments: Vec<EmiInstallment>,
    pub transactions: Vec<Transaction>,
}

impl ContractLedger {
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            installments: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn disbursed_transaction(&self) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|t| t.status == TransactionStatus::Disbursed)
    }

    /// Whether a successful payment with this reference is already booked
    pub fn has_settled_ref(&self, gateway_ref: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.gateway_ref == gateway_ref && t.status != TransactionStatus::Failed)
    }

    pub fn has_failed_ref(&self, gateway_ref: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.gateway_ref == gateway_ref && t.status == TransactionStatus::Failed)
    }

    pub fn next_unpaid(&self) -> Option<&EmiInstallment> {
        self.installments
            .iter()
            .filter(|e| e.status == EmiStatus::Pending)
            .min_by_key(|e| e.emi_number)
    }

    pub fn all_paid(&self) -> bool {
        !self.installments.is_empty()
            && self
                .installments
                .iter()
                .all(|e| e.status == EmiStatus::Paid)
    }

    /// Receiver confirms the disbursed funds arrived. The loan clock starts
    /// here: dates are re-anchored and the schedule is materialized.
    pub fn confirm_receipt(&mut self, actor: &Actor, now: DateTime<Utc>) -> LendingResult<()> {
        actor.require_role(UserRole::Receiver)?;
        if actor.user_id != self.contract.receiver_id {
            return Err(LendingError::role(
                "Only the contract's receiver can confirm receipt",
            ));
        }
        if self.contract.status != ContractStatus::AwaitingReceiptConfirmation {
            return Err(LendingError::state(format!(
                "Receipt can only be confirmed while awaiting confirmation (contract is {:?})",
                self.contract.status
            )));
        }

        let schedule = generate_schedule(self.contract.id, self.contract.schedule_terms(), now)?;

        self.contract.transition(ContractStatus::Active, now)?;
        self.contract.start_date = now;
        self.contract.end_date = now + Duration::days(self.contract.tenor_days as i64);
        self.installments = schedule;
        Ok(())
    }

    /// Delinquency policy: an active contract whose oldest unpaid installment
    /// is more than `grace` past due defaults.
    pub fn default_if_delinquent(
        &mut self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> LendingResult<Vec<TrustDelta>> {
        if self.contract.status != ContractStatus::Active {
            return Ok(Vec::new());
        }
        let delinquent = self
            .next_unpaid()
            .map(|emi| emi.due_date + grace < now)
            .unwrap_or(false);
        if !delinquent {
            return Ok(Vec::new());
        }

        self.contract.transition(ContractStatus::Defaulted, now)?;
        Ok(vec![
            TrustDelta::new(
                self.contract.receiver_id,
                DEFAULT_RECEIVER_DELTA,
                TrustReason::ContractDefaulted,
            ),
            TrustDelta::new(
                self.contract.guarantor_id,
                DEFAULT_GUARANTOR_DELTA,
                TrustReason::GuaranteedContractDefaulted,
            ),
        ])
    }
}

/// Request DTO for a lender accepting a loan request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContractRequest {
    pub loan_request_id: Uuid,
    pub brochure_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> Contract {
        let brochure = LoanBrochure::new(Uuid::new_v4(), 10_000, 1_000, 90);
        Contract::draft(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            &brochure,
            Utc::now(),
        )
    }

    #[test]
    fn test_transition_table() {
        use ContractStatus::*;
        assert!(Created.can_transition_to(PendingSignatures));
        assert!(PendingSignatures.can_transition_to(AwaitingDisbursal));
        assert!(AwaitingDisbursal.can_transition_to(AwaitingReceiptConfirmation));
        assert!(AwaitingReceiptConfirmation.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Defaulted));

        assert!(!AwaitingDisbursal.can_transition_to(Active));
        assert!(!PendingSignatures.can_transition_to(AwaitingReceiptConfirmation));
        assert!(Completed.is_terminal());
        assert!(Defaulted.is_terminal());
    }

    #[test]
    fn test_illegal_transition_does_not_mutate() {
        let mut c = contract();
        let before = c.clone();
        let err = c.transition(ContractStatus::Active, Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::State(_)));
        assert_eq!(c, before);
    }

    #[test]
    fn test_draft_terms() {
        let c = contract();
        assert_eq!(c.total_repayable, 11_000);
        assert_eq!(c.installment_count, 3);
        assert_eq!(c.status, ContractStatus::Created);
    }

    #[test]
    fn test_signing_is_order_independent() {
        for lender_first in [true, false] {
            let mut c = contract();
            let receiver = Actor::receiver(c.receiver_id);
            let lender = Actor::lender(c.lender_id);
            let (first, second) = if lender_first {
                (lender, receiver)
            } else {
                (receiver, lender)
            };

            assert!(!c.sign(&first, Utc::now()).unwrap());
            assert_eq!(c.status, ContractStatus::PendingSignatures);
            assert!(c.sign(&second, Utc::now()).unwrap());
            assert_eq!(c.status, ContractStatus::AwaitingDisbursal);
        }
    }

    #[test]
    fn test_resigning_is_noop() {
        let mut c = contract();
        let receiver = Actor::receiver(c.receiver_id);
        c.sign(&receiver, Utc::now()).unwrap();
        let before = c.clone();
        assert!(!c.sign(&receiver, Utc::now()).unwrap());
        assert_eq!(c, before);
    }

    #[test]
    fn test_stranger_cannot_sign() {
        let mut c = contract();
        let err = c
            .sign(&Actor::receiver(Uuid::new_v4()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LendingError::Role(_)));
        let err = c
            .sign(&Actor::lender(c.receiver_id), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LendingError::Role(_)));
    }

    #[test]
    fn test_confirm_receipt_requires_awaiting_confirmation() {
        let mut ledger = ContractLedger::new(contract());
        let receiver = Actor::receiver(ledger.contract.receiver_id);
        let err = ledger.confirm_receipt(&receiver, Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::State(_)));
        assert!(ledger.installments.is_empty());

        ledger.contract.status = ContractStatus::AwaitingReceiptConfirmation;
        ledger.confirm_receipt(&receiver, Utc::now()).unwrap();
        assert_eq!(ledger.contract.status, ContractStatus::Active);
        assert_eq!(ledger.installments.len(), 3);
        assert_eq!(
            ledger.installments.last().unwrap().due_date,
            ledger.contract.end_date
        );
    }

    #[test]
    fn test_default_after_grace() {
        let mut ledger = ContractLedger::new(contract());
        ledger.contract.status = ContractStatus::AwaitingReceiptConfirmation;
        let start = Utc::now();
        ledger
            .confirm_receipt(&Actor::receiver(ledger.contract.receiver_id), start)
            .unwrap();

        let grace = Duration::days(10);
        let first_due = ledger.installments[0].due_date;
        assert!(ledger
            .default_if_delinquent(first_due + Duration::days(5), grace)
            .unwrap()
            .is_empty());
        assert_eq!(ledger.contract.status, ContractStatus::Active);

        let deltas = ledger
            .default_if_delinquent(first_due + Duration::days(11), grace)
            .unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(ledger.contract.status, ContractStatus::Defaulted);
    }
}
