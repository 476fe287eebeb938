//! Payment reconciliation engine
//!
//! Turns verified gateway events into ledger entries and contract
//! transitions. The whole check-then-act step for one event runs inside the
//! contract's unit of work, so replays and concurrent deliveries see each
//! other's effects. Everything that is not an infrastructure failure ends in
//! an outcome the webhook acknowledges.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{PaymentEvent, PaymentEventType, PaymentType, Transaction, TransactionStatus};
use crate::contract::{ContractLedger, ContractStatus, EmiStatus};
use crate::error::{LendingError, LendingResult};
use crate::services::trust_index::{
    COMPLETION_GUARANTOR_DELTA, COMPLETION_RECEIVER_DELTA, LATE_EMI_DELTA, ON_TIME_EMI_DELTA,
};
use crate::services::{apply_trust_deltas, TrustDelta, TrustReason};
use crate::store::{with_contract, LendingStore};

/// What handling an event did
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationOutcome {
    /// Disbursal booked and/or the contract moved to receipt confirmation
    Disbursed,
    /// An installment was settled
    EmiSettled,
    /// The installment settled was the last one and the contract completed
    ContractCompleted,
    /// A payment was booked but there was no unpaid installment to settle
    Unallocated,
    /// A failed payment was recorded for audit
    FailureRecorded,
    /// Already applied earlier
    Duplicate,
    /// Does not apply to the contract's current state
    Stale,
    /// No such contract
    UnknownContract,
}

impl ReconciliationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Disbursed => "DISBURSED",
            ReconciliationOutcome::EmiSettled => "EMI_SETTLED",
            ReconciliationOutcome::ContractCompleted => "CONTRACT_COMPLETED",
            ReconciliationOutcome::Unallocated => "UNALLOCATED",
            ReconciliationOutcome::FailureRecorded => "FAILURE_RECORDED",
            ReconciliationOutcome::Duplicate => "DUPLICATE",
            ReconciliationOutcome::Stale => "STALE",
            ReconciliationOutcome::UnknownContract => "UNKNOWN_CONTRACT",
        }
    }
}

type Reconciled = (ReconciliationOutcome, Vec<TrustDelta>);

pub struct ReconciliationEngine {
    store: Arc<dyn LendingStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        Self { store }
    }

    pub async fn handle_event(&self, event: &PaymentEvent) -> LendingResult<ReconciliationOutcome> {
        self.handle_event_at(event, Utc::now()).await
    }

    /// Apply `event` as of `now`. Errors only on infrastructure failure.
    pub async fn handle_event_at(
        &self,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> LendingResult<ReconciliationOutcome> {
        let result = with_contract(self.store.as_ref(), event.contract_id, |ledger| {
            reconcile(ledger, event, now)
        })
        .await;

        let (outcome, deltas) = match result {
            Ok(reconciled) => reconciled,
            Err(LendingError::NotFound(_)) => {
                tracing::warn!(
                    contract_id = %event.contract_id,
                    gateway_ref = %event.gateway_order_ref,
                    "Payment event for unknown contract acknowledged"
                );
                return Ok(ReconciliationOutcome::UnknownContract);
            }
            Err(e) if e.is_server_error() => return Err(e),
            Err(e) => {
                // Domain rejections inside the unit mean the event does not fit
                // this contract; nothing was written.
                tracing::warn!(
                    contract_id = %event.contract_id,
                    gateway_ref = %event.gateway_order_ref,
                    error = %e,
                    "Payment event rejected by contract"
                );
                return Ok(ReconciliationOutcome::Stale);
            }
        };

        apply_trust_deltas(self.store.as_ref(), &deltas).await;

        tracing::info!(
            contract_id = %event.contract_id,
            event_type = ?event.event_type,
            payment_type = event.payment_type.as_str(),
            gateway_ref = %event.gateway_order_ref,
            outcome = outcome.as_str(),
            "Payment event reconciled"
        );
        Ok(outcome)
    }
}

/// The per-contract decision. Only touches `ledger` when the event applies.
pub fn reconcile(
    ledger: &mut ContractLedger,
    event: &PaymentEvent,
    now: DateTime<Utc>,
) -> LendingResult<Reconciled> {
    match (event.event_type, event.payment_type) {
        (PaymentEventType::Completed, PaymentType::Disbursal) => {
            Ok((reconcile_disbursal(ledger, event, now)?, Vec::new()))
        }
        (PaymentEventType::Completed, PaymentType::Emi) => reconcile_emi(ledger, event, now),
        (PaymentEventType::Failed, _) => Ok((record_failure(ledger, event, now), Vec::new())),
    }
}

fn reconcile_disbursal(
    ledger: &mut ContractLedger,
    event: &PaymentEvent,
    now: DateTime<Utc>,
) -> LendingResult<ReconciliationOutcome> {
    let status = ledger.contract.status;
    if status.stage() < ContractStatus::AwaitingDisbursal.stage() {
        tracing::warn!(
            contract_id = %ledger.contract.id,
            status = ?status,
            "Disbursal completed before the contract was signed; ignoring"
        );
        return Ok(ReconciliationOutcome::Stale);
    }

    let mut changed = false;
    if ledger.disbursed_transaction().is_none() {
        let contract = &ledger.contract;
        ledger.transactions.push(Transaction::new(
            contract.id,
            contract.lender_id,
            contract.receiver_id,
            contract.principal,
            TransactionStatus::Disbursed,
            PaymentType::Disbursal,
            event.gateway_order_ref.as_str(),
            None,
            now,
        ));
        changed = true;
    }

    if status == ContractStatus::AwaitingDisbursal {
        ledger
            .contract
            .transition(ContractStatus::AwaitingReceiptConfirmation, now)?;
        changed = true;
    }

    Ok(if changed {
        ReconciliationOutcome::Disbursed
    } else {
        ReconciliationOutcome::Duplicate
    })
}

fn reconcile_emi(
    ledger: &mut ContractLedger,
    event: &PaymentEvent,
    now: DateTime<Utc>,
) -> LendingResult<Reconciled> {
    if ledger.has_settled_ref(&event.gateway_order_ref) {
        return Ok((ReconciliationOutcome::Duplicate, Vec::new()));
    }
    let status = ledger.contract.status;
    if status.stage() < ContractStatus::Active.stage() {
        tracing::warn!(
            contract_id = %ledger.contract.id,
            status = ?status,
            "EMI payment for a contract that is not active yet; ignoring"
        );
        return Ok((ReconciliationOutcome::Stale, Vec::new()));
    }
    if status != ContractStatus::Active {
        return Ok((book_unallocated(ledger, event, now), Vec::new()));
    }

    let target = match event.emi_number {
        Some(n) => match ledger.installments.iter().position(|e| e.emi_number == n) {
            // Paid twice through separate checkouts: the extra payment covers
            // the next installment instead
            Some(idx) if ledger.installments[idx].status == EmiStatus::Paid => {
                first_pending(ledger)
            }
            Some(idx) => Some(idx),
            None => {
                tracing::warn!(
                    contract_id = %ledger.contract.id,
                    emi_number = n,
                    "EMI payment for an installment that does not exist; ignoring"
                );
                return Ok((ReconciliationOutcome::Stale, Vec::new()));
            }
        },
        None => first_pending(ledger),
    };
    let Some(target) = target else {
        return Ok((book_unallocated(ledger, event, now), Vec::new()));
    };

    let contract = &ledger.contract;
    let emi = &mut ledger.installments[target];
    ledger.transactions.push(Transaction::new(
        contract.id,
        contract.receiver_id,
        contract.lender_id,
        emi.total(),
        TransactionStatus::Acknowledged,
        PaymentType::Emi,
        event.gateway_order_ref.as_str(),
        Some(emi.emi_number),
        now,
    ));
    emi.status = EmiStatus::Paid;
    emi.paid_at = Some(now);

    let mut deltas = vec![if now <= emi.due_date {
        TrustDelta::new(contract.receiver_id, ON_TIME_EMI_DELTA, TrustReason::OnTimeEmi)
    } else {
        TrustDelta::new(contract.receiver_id, LATE_EMI_DELTA, TrustReason::LateEmi)
    }];

    if !ledger.all_paid() {
        return Ok((ReconciliationOutcome::EmiSettled, deltas));
    }

    ledger.contract.transition(ContractStatus::Completed, now)?;
    deltas.push(TrustDelta::new(
        ledger.contract.receiver_id,
        COMPLETION_RECEIVER_DELTA,
        TrustReason::ContractCompleted,
    ));
    deltas.push(TrustDelta::new(
        ledger.contract.guarantor_id,
        COMPLETION_GUARANTOR_DELTA,
        TrustReason::GuaranteedContractCompleted,
    ));
    Ok((ReconciliationOutcome::ContractCompleted, deltas))
}

fn first_pending(ledger: &ContractLedger) -> Option<usize> {
    ledger
        .installments
        .iter()
        .position(|e| e.status == EmiStatus::Pending)
}

/// A new EMI payment with nothing left to settle. Booked so the money is
/// accounted for; no installment or status changes.
fn book_unallocated(
    ledger: &mut ContractLedger,
    event: &PaymentEvent,
    now: DateTime<Utc>,
) -> ReconciliationOutcome {
    let contract = &ledger.contract;
    let amount = event
        .emi_number
        .and_then(|n| ledger.installments.iter().find(|e| e.emi_number == n))
        .or_else(|| ledger.installments.last())
        .map(|e| e.total())
        .unwrap_or(0);

    tracing::warn!(
        contract_id = %contract.id,
        status = ?contract.status,
        gateway_ref = %event.gateway_order_ref,
        amount = amount,
        "EMI payment with no unpaid installment; booked without allocation"
    );
    ledger.transactions.push(Transaction::new(
        contract.id,
        contract.receiver_id,
        contract.lender_id,
        amount,
        TransactionStatus::Acknowledged,
        PaymentType::Emi,
        event.gateway_order_ref.as_str(),
        None,
        now,
    ));
    ReconciliationOutcome::Unallocated
}

fn record_failure(
    ledger: &mut ContractLedger,
    event: &PaymentEvent,
    now: DateTime<Utc>,
) -> ReconciliationOutcome {
    let reference = event.gateway_order_ref.as_str();
    if ledger.has_failed_ref(reference) || ledger.has_settled_ref(reference) {
        return ReconciliationOutcome::Duplicate;
    }

    let contract = &ledger.contract;
    let (from, to, amount, emi_number) = match event.payment_type {
        PaymentType::Disbursal => (
            contract.lender_id,
            contract.receiver_id,
            contract.principal,
            None,
        ),
        PaymentType::Emi => {
            let emi = match event.emi_number {
                Some(n) => ledger.installments.iter().find(|e| e.emi_number == n),
                None => ledger.next_unpaid(),
            };
            (
                contract.receiver_id,
                contract.lender_id,
                emi.map(|e| e.total()).unwrap_or(0),
                emi.map(|e| e.emi_number),
            )
        }
    };

    tracing::warn!(
        contract_id = %contract.id,
        gateway_ref = %reference,
        payment_type = event.payment_type.as_str(),
        "Payment failed at gateway"
    );

    let failed = Transaction::new(
        contract.id,
        from,
        to,
        amount,
        TransactionStatus::Failed,
        event.payment_type,
        reference,
        emi_number,
        now,
    );
    ledger.transactions.push(failed);
    ReconciliationOutcome::FailureRecorded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Contract;
    use crate::models::{Actor, LoanBrochure};
    use chrono::Duration;
    use uuid::Uuid;

    fn active_ledger() -> ContractLedger {
        let brochure = LoanBrochure::new(Uuid::new_v4(), 10_000, 1_000, 90);
        let contract = Contract::draft(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            &brochure,
            Utc::now(),
        );
        let mut ledger = ContractLedger::new(contract);
        ledger.contract.status = ContractStatus::AwaitingReceiptConfirmation;
        let receiver = Actor::receiver(ledger.contract.receiver_id);
        ledger.confirm_receipt(&receiver, Utc::now()).unwrap();
        ledger
    }

    fn emi_event(ledger: &ContractLedger, reference: &str) -> PaymentEvent {
        PaymentEvent::completed(ledger.contract.id, PaymentType::Emi, reference)
    }

    #[test]
    fn test_disbursal_before_signatures_is_stale() {
        let mut ledger = active_ledger();
        ledger.contract.status = ContractStatus::PendingSignatures;
        ledger.installments.clear();
        let before = ledger.clone();
        let event = PaymentEvent::completed(ledger.contract.id, PaymentType::Disbursal, "D_1");
        let (outcome, _) = reconcile(&mut ledger, &event, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::Stale);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_emi_settles_next_unpaid_with_on_time_delta() {
        let mut ledger = active_ledger();
        let event = emi_event(&ledger, "EMI_1");
        let (outcome, deltas) = reconcile(&mut ledger, &event, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::EmiSettled);
        assert_eq!(ledger.installments[0].status, EmiStatus::Paid);
        assert_eq!(ledger.transactions.len(), 1);
        assert_eq!(ledger.transactions[0].amount, 3_333 + 333);
        assert_eq!(deltas[0].reason, TrustReason::OnTimeEmi);
    }

    #[test]
    fn test_late_payment_gets_late_delta() {
        let mut ledger = active_ledger();
        let late = ledger.installments[0].due_date + Duration::days(1);
        let event = emi_event(&ledger, "EMI_1");
        let (_, deltas) = reconcile(&mut ledger, &event, late).unwrap();
        assert_eq!(deltas[0].reason, TrustReason::LateEmi);
        assert_eq!(deltas[0].delta, LATE_EMI_DELTA);
    }

    #[test]
    fn test_second_payment_for_paid_installment_settles_next() {
        let mut ledger = active_ledger();
        let first = emi_event(&ledger, "EMI_a").for_emi(1);
        reconcile(&mut ledger, &first, Utc::now()).unwrap();

        let second = emi_event(&ledger, "EMI_b").for_emi(1);
        let (outcome, deltas) = reconcile(&mut ledger, &second, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::EmiSettled);
        assert_eq!(deltas.len(), 1);
        assert_eq!(ledger.installments[0].status, EmiStatus::Paid);
        assert_eq!(ledger.installments[1].status, EmiStatus::Paid);
        assert_eq!(ledger.transactions.len(), 2);
        assert_eq!(ledger.transactions[1].emi_number, Some(2));

        // The same delivery again is still a duplicate
        let (outcome, _) = reconcile(&mut ledger, &second, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::Duplicate);
        assert_eq!(ledger.transactions.len(), 2);
    }

    #[test]
    fn test_payment_after_completion_is_booked_unallocated() {
        let mut ledger = active_ledger();
        for reference in ["E1", "E2", "E3"] {
            let event = emi_event(&ledger, reference);
            reconcile(&mut ledger, &event, Utc::now()).unwrap();
        }
        assert_eq!(ledger.contract.status, ContractStatus::Completed);

        let extra = emi_event(&ledger, "E3_again").for_emi(3);
        let (outcome, deltas) = reconcile(&mut ledger, &extra, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::Unallocated);
        assert!(deltas.is_empty());
        assert_eq!(ledger.contract.status, ContractStatus::Completed);
        assert_eq!(ledger.transactions.len(), 4);
        let booked = &ledger.transactions[3];
        assert_eq!(booked.status, TransactionStatus::Acknowledged);
        assert_eq!(booked.emi_number, None);
        assert_eq!(booked.amount, ledger.installments[2].total());
    }

    #[test]
    fn test_last_emi_completes_contract() {
        let mut ledger = active_ledger();
        for (i, reference) in ["E1", "E2"].iter().enumerate() {
            let event = emi_event(&ledger, reference);
            let (outcome, _) = reconcile(&mut ledger, &event, Utc::now()).unwrap();
            assert_eq!(outcome, ReconciliationOutcome::EmiSettled, "emi {}", i + 1);
        }
        let event = emi_event(&ledger, "E3");
        let (outcome, deltas) = reconcile(&mut ledger, &event, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::ContractCompleted);
        assert_eq!(ledger.contract.status, ContractStatus::Completed);
        assert_eq!(deltas.len(), 3);
        let paid: i64 = ledger.transactions.iter().map(|t| t.amount).sum();
        assert_eq!(paid, ledger.contract.total_repayable);
    }

    #[test]
    fn test_failure_is_recorded_once_without_state_change() {
        let mut ledger = active_ledger();
        let status = ledger.contract.status;
        let event = PaymentEvent::failed(ledger.contract.id, PaymentType::Emi, "EMI_f");
        let (outcome, _) = reconcile(&mut ledger, &event, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::FailureRecorded);
        let (outcome, _) = reconcile(&mut ledger, &event, Utc::now()).unwrap();
        assert_eq!(outcome, ReconciliationOutcome::Duplicate);

        assert_eq!(ledger.contract.status, status);
        assert_eq!(ledger.transactions.len(), 1);
        assert_eq!(ledger.transactions[0].status, TransactionStatus::Failed);
        assert!(ledger
            .installments
            .iter()
            .all(|e| e.status == EmiStatus::Pending));
    }
}
