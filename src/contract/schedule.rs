//! EMI schedule generation
//!
//! Interest is flat over the whole tenor. Principal and interest are each split
//! into equal whole-unit parts and the last installment takes the remainder, so
//! the columns always sum to the exact totals.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LendingError, LendingResult};

const BPS_DENOMINATOR: i128 = 10_000;

/// Installment status. Overdue is derived at read time and never stored.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "emi_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmiStatus {
    Pending,
    Paid,
}

/// A single scheduled installment
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct EmiInstallment {
    pub contract_id: Uuid,
    pub emi_number: i32,
    pub due_date: DateTime<Utc>,
    pub principal_component: i64,
    pub interest_component: i64,
    pub status: EmiStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl EmiInstallment {
    pub fn total(&self) -> i64 {
        self.principal_component + self.interest_component
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == EmiStatus::Pending && self.due_date < now
    }
}

/// Loan terms the schedule is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTerms {
    pub principal: i64,
    pub interest_rate_bps: i32,
    pub tenor_days: i32,
    pub installment_count: i32,
}

/// Flat interest over the full tenor, rounded half-up to a whole unit
pub fn total_interest(principal: i64, interest_rate_bps: i32) -> i64 {
    let raw = principal as i128 * interest_rate_bps as i128;
    ((raw + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR) as i64
}

pub fn total_repayable(principal: i64, interest_rate_bps: i32) -> i64 {
    principal + total_interest(principal, interest_rate_bps)
}

/// One installment per started 30-day period, at least one
pub fn default_installment_count(tenor_days: i32) -> i32 {
    (tenor_days / 30).max(1)
}

/// Split `total` into `parts` whole-unit components, remainder on the last
fn split_evenly(total: i64, parts: i32) -> Vec<i64> {
    let parts = parts as i64;
    let base = total / parts;
    let mut components = vec![base; parts as usize];
    if let Some(last) = components.last_mut() {
        *last = total - base * (parts - 1);
    }
    components
}

/// Build the repayment plan for a contract starting at `start_date`.
///
/// Due dates are spaced evenly over the tenor; the last one falls exactly on
/// `start_date + tenor_days`.
pub fn generate_schedule(
    contract_id: Uuid,
    terms: ScheduleTerms,
    start_date: DateTime<Utc>,
) -> LendingResult<Vec<EmiInstallment>> {
    if terms.principal <= 0 {
        return Err(LendingError::validation("Principal must be greater than 0"));
    }
    if terms.interest_rate_bps < 0 {
        return Err(LendingError::validation("Interest rate cannot be negative"));
    }
    if terms.tenor_days <= 0 {
        return Err(LendingError::validation("Tenor must be at least one day"));
    }
    if terms.installment_count <= 0 {
        return Err(LendingError::validation(
            "Installment count must be at least one",
        ));
    }

    let end_date = start_date + Duration::days(terms.tenor_days as i64);
    let span = end_date - start_date;
    let n = terms.installment_count;

    let principals = split_evenly(terms.principal, n);
    let interests = split_evenly(total_interest(terms.principal, terms.interest_rate_bps), n);

    let schedule = principals
        .into_iter()
        .zip(interests)
        .enumerate()
        .map(|(idx, (principal_component, interest_component))| {
            let emi_number = idx as i32 + 1;
            let due_date = if emi_number == n {
                end_date
            } else {
                start_date + span * emi_number / n
            };
            EmiInstallment {
                contract_id,
                emi_number,
                due_date,
                principal_component,
                interest_component,
                status: EmiStatus::Pending,
                paid_at: None,
            }
        })
        .collect();

    Ok(schedule)
}

/// Read-time view of one installment
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EmiView {
    pub emi_number: i32,
    pub due_date: DateTime<Utc>,
    pub principal: i64,
    pub interest: i64,
    pub total: i64,
    pub status: EmiStatus,
    pub overdue: bool,
    pub display_status: &'static str,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Read-time view of a whole schedule with column totals
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub schedule: Vec<EmiView>,
    pub total_principal: i64,
    pub total_interest: i64,
    pub total_amount: i64,
}

impl ScheduleView {
    pub fn build(installments: &[EmiInstallment], now: DateTime<Utc>) -> Self {
        let schedule: Vec<EmiView> = installments
            .iter()
            .map(|emi| {
                let overdue = emi.is_overdue(now);
                EmiView {
                    emi_number: emi.emi_number,
                    due_date: emi.due_date,
                    principal: emi.principal_component,
                    interest: emi.interest_component,
                    total: emi.total(),
                    status: emi.status,
                    overdue,
                    display_status: match (emi.status, overdue) {
                        (EmiStatus::Paid, _) => "PAID",
                        (EmiStatus::Pending, true) => "OVERDUE",
                        (EmiStatus::Pending, false) => "PENDING",
                    },
                    paid_at: emi.paid_at,
                }
            })
            .collect();

        let total_principal = schedule.iter().map(|e| e.principal).sum();
        let total_interest = schedule.iter().map(|e| e.interest).sum();

        Self {
            schedule,
            total_principal,
            total_interest,
            total_amount: total_principal + total_interest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn terms(principal: i64, bps: i32, tenor_days: i32, n: i32) -> ScheduleTerms {
        ScheduleTerms {
            principal,
            interest_rate_bps: bps,
            tenor_days,
            installment_count: n,
        }
    }

    #[test]
    fn test_reference_example() {
        let schedule = generate_schedule(Uuid::new_v4(), terms(10_000, 1_000, 90, 3), start())
            .unwrap();

        assert_eq!(total_repayable(10_000, 1_000), 11_000);
        assert_eq!(schedule.len(), 3);
        assert_eq!(
            schedule.iter().map(|e| e.principal_component).sum::<i64>(),
            10_000
        );
        assert_eq!(
            schedule.iter().map(|e| e.interest_component).sum::<i64>(),
            1_000
        );
        assert_eq!(schedule[0].principal_component, 3_333);
        assert_eq!(schedule[1].principal_component, 3_333);
        assert_eq!(schedule[2].principal_component, 3_334);
        assert_eq!(schedule[0].interest_component, 333);
        assert_eq!(schedule[2].interest_component, 334);
        assert_eq!(schedule[2].due_date, start() + Duration::days(90));
        assert_eq!(schedule[0].due_date, start() + Duration::days(30));
    }

    #[test]
    fn test_sums_are_exact_across_inputs() {
        for principal in [1_i64, 7, 999, 10_000, 123_457, 5_000_001] {
            for bps in [0, 1, 333, 1_000, 1_250, 2_499] {
                for n in 1..=13 {
                    let schedule =
                        generate_schedule(Uuid::new_v4(), terms(principal, bps, 365, n), start())
                            .unwrap();
                    let p: i64 = schedule.iter().map(|e| e.principal_component).sum();
                    let i: i64 = schedule.iter().map(|e| e.interest_component).sum();
                    assert_eq!(p, principal);
                    assert_eq!(i, total_interest(principal, bps));
                }
            }
        }
    }

    #[test]
    fn test_remainder_only_on_last_installment() {
        let schedule = generate_schedule(Uuid::new_v4(), terms(1_000, 700, 180, 6), start())
            .unwrap();
        let first = schedule[0].principal_component;
        assert!(schedule[..5].iter().all(|e| e.principal_component == first));
        assert!(schedule[5].principal_component >= first);
    }

    #[test]
    fn test_due_dates_ascending_and_end_on_tenor() {
        let schedule = generate_schedule(Uuid::new_v4(), terms(50_000, 1_200, 100, 7), start())
            .unwrap();
        for pair in schedule.windows(2) {
            assert!(pair[0].due_date < pair[1].due_date);
        }
        assert_eq!(
            schedule.last().unwrap().due_date,
            start() + Duration::days(100)
        );
        assert!(schedule.iter().all(|e| e.status == EmiStatus::Pending));
    }

    #[test]
    fn test_rejects_bad_terms() {
        assert!(generate_schedule(Uuid::new_v4(), terms(0, 1_000, 90, 3), start()).is_err());
        assert!(generate_schedule(Uuid::new_v4(), terms(100, 1_000, 0, 3), start()).is_err());
        assert!(generate_schedule(Uuid::new_v4(), terms(100, 1_000, 90, 0), start()).is_err());
        assert!(generate_schedule(Uuid::new_v4(), terms(100, -1, 90, 3), start()).is_err());
    }

    #[test]
    fn test_overdue_is_derived() {
        let mut schedule = generate_schedule(Uuid::new_v4(), terms(900, 0, 90, 3), start())
            .unwrap();
        let later = start() + Duration::days(45);
        schedule[1].status = EmiStatus::Paid;

        let view = ScheduleView::build(&schedule, later);
        assert_eq!(view.schedule[0].display_status, "OVERDUE");
        assert_eq!(view.schedule[1].display_status, "PAID");
        assert_eq!(view.schedule[2].display_status, "PENDING");
        assert_eq!(view.total_amount, 900);
    }

    #[test]
    fn test_default_installment_count() {
        assert_eq!(default_installment_count(7), 1);
        assert_eq!(default_installment_count(90), 3);
        assert_eq!(default_installment_count(365), 12);
    }
}
