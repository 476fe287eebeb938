//! Trust index policy and the updater interface
//!
//! The scoring formula that produces a user's trust index lives elsewhere. This
//! module only owns the two touch points the lending core needs: the loan limit
//! table that gates eligibility, and the delta events emitted after settlement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LendingResult;

// ============================================================================
// Loan Limit Policy
// ============================================================================

/// (minimum trust index, maximum loan amount) tiers, ascending by trust index
const LOAN_LIMIT_TIERS: &[(i32, i64)] = &[
    (0, 1_000),
    (300, 5_000),
    (400, 10_000),
    (500, 25_000),
    (600, 50_000),
    (700, 100_000),
    (800, 200_000),
];

/// Maximum principal a user with `trust_index` may request.
///
/// Negative scores are not eligible for any amount. The table is ascending in
/// both columns, so the result never decreases as the trust index grows.
pub fn max_loan_limit(trust_index: i32) -> i64 {
    LOAN_LIMIT_TIERS
        .iter()
        .rev()
        .find(|(threshold, _)| trust_index >= *threshold)
        .map(|(_, limit)| *limit)
        .unwrap_or(0)
}

// ============================================================================
// Trust Deltas
// ============================================================================

pub const ON_TIME_EMI_DELTA: i32 = 5;
pub const LATE_EMI_DELTA: i32 = -10;
pub const COMPLETION_RECEIVER_DELTA: i32 = 20;
pub const COMPLETION_GUARANTOR_DELTA: i32 = 5;
pub const DEFAULT_RECEIVER_DELTA: i32 = -50;
pub const DEFAULT_GUARANTOR_DELTA: i32 = -25;

/// Why a trust index moved
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustReason {
    OnTimeEmi,
    LateEmi,
    ContractCompleted,
    GuaranteedContractCompleted,
    ContractDefaulted,
    GuaranteedContractDefaulted,
}

impl TrustReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustReason::OnTimeEmi => "ON_TIME_EMI",
            TrustReason::LateEmi => "LATE_EMI",
            TrustReason::ContractCompleted => "CONTRACT_COMPLETED",
            TrustReason::GuaranteedContractCompleted => "GUARANTEED_CONTRACT_COMPLETED",
            TrustReason::ContractDefaulted => "CONTRACT_DEFAULTED",
            TrustReason::GuaranteedContractDefaulted => "GUARANTEED_CONTRACT_DEFAULTED",
        }
    }
}

/// A pending score change produced inside a contract's atomic unit and
/// applied once that unit has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustDelta {
    pub user_id: Uuid,
    pub delta: i32,
    pub reason: TrustReason,
}

impl TrustDelta {
    pub fn new(user_id: Uuid, delta: i32, reason: TrustReason) -> Self {
        Self {
            user_id,
            delta,
            reason,
        }
    }
}

/// Receives score deltas. Implemented by the persistence layer.
#[async_trait]
pub trait TrustIndexUpdater: Send + Sync {
    async fn apply_delta(&self, user_id: Uuid, delta: i32, reason: TrustReason)
        -> LendingResult<()>;
}

/// Apply deltas after commit. Failures are logged and swallowed: the contract
/// transition that produced them has already happened.
pub async fn apply_trust_deltas<U>(updater: &U, deltas: &[TrustDelta])
where
    U: TrustIndexUpdater + ?Sized,
{
    for delta in deltas {
        if let Err(e) = updater
            .apply_delta(delta.user_id, delta.delta, delta.reason)
            .await
        {
            tracing::error!(
                user_id = %delta.user_id,
                delta = delta.delta,
                reason = delta.reason.as_str(),
                error = %e,
                "Failed to apply trust index delta"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_tiers() {
        assert_eq!(max_loan_limit(-5), 0);
        assert_eq!(max_loan_limit(0), 1_000);
        assert_eq!(max_loan_limit(299), 1_000);
        assert_eq!(max_loan_limit(300), 5_000);
        assert_eq!(max_loan_limit(450), 10_000);
        assert_eq!(max_loan_limit(999), 200_000);
    }

    #[test]
    fn test_limit_is_monotonic() {
        let mut previous = max_loan_limit(-1_000);
        for trust_index in -1_000..=2_000 {
            let limit = max_loan_limit(trust_index);
            assert!(
                limit >= previous,
                "limit dropped at trust index {}",
                trust_index
            );
            previous = limit;
        }
        assert!(max_loan_limit(i32::MAX) >= max_loan_limit(i32::MIN));
    }

    #[test]
    fn test_tier_table_is_sorted() {
        for pair in LOAN_LIMIT_TIERS.windows(2) {
            assert!(pair[0].0 < pair[1].0);
            assert!(pair[0].1 <= pair[1].1);
        }
    }
}
