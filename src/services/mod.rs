//! Pure policy services shared by the lending domain

pub mod eligibility;
pub mod trust_index;

pub use eligibility::{validate_guarantor_nomination, validate_request_creation};
pub use trust_index::{
    apply_trust_deltas, max_loan_limit, TrustDelta, TrustIndexUpdater, TrustReason,
};
