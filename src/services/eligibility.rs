//! Eligibility gate for loan requests
//!
//! Pure rules only: callers load the receiver, brochures and existing request
//! state, and these functions decide.

use std::collections::HashSet;

use uuid::Uuid;

use super::trust_index::max_loan_limit;
use crate::error::{LendingError, LendingResult};
use crate::models::{Actor, LoanBrochure, User, UserRole};

pub const MIN_BROCHURES_PER_REQUEST: usize = 1;
pub const MAX_BROCHURES_PER_REQUEST: usize = 3;

/// Decide whether `receiver` may open a request over `brochure_ids`.
///
/// `brochures` holds whatever the store resolved for `brochure_ids`; missing
/// or inactive entries fail validation.
pub fn validate_request_creation(
    actor: &Actor,
    receiver: &User,
    brochure_ids: &[Uuid],
    brochures: &[LoanBrochure],
    has_active_request: bool,
) -> LendingResult<()> {
    actor.require_role(UserRole::Receiver)?;

    if actor.user_id != receiver.id {
        return Err(LendingError::role(
            "Loan requests can only be created for your own account",
        ));
    }

    if brochure_ids.len() < MIN_BROCHURES_PER_REQUEST
        || brochure_ids.len() > MAX_BROCHURES_PER_REQUEST
    {
        return Err(LendingError::validation(format!(
            "You must select between {} and {} brochures to apply for.",
            MIN_BROCHURES_PER_REQUEST, MAX_BROCHURES_PER_REQUEST
        )));
    }

    let unique: HashSet<&Uuid> = brochure_ids.iter().collect();
    if unique.len() != brochure_ids.len() {
        return Err(LendingError::validation(
            "The same brochure cannot be selected twice.",
        ));
    }

    if has_active_request {
        return Err(LendingError::conflict(
            "You already have an active loan request.",
        ));
    }

    let all_resolved = brochure_ids.iter().all(|id| {
        brochures
            .iter()
            .any(|brochure| brochure.id == *id && brochure.active)
    });
    if !all_resolved {
        return Err(LendingError::validation(
            "One or more of the selected brochures are invalid or no longer active.",
        ));
    }

    let max_loan = max_loan_limit(receiver.trust_index);
    if let Some(brochure) = brochures.iter().find(|b| b.amount > max_loan) {
        return Err(LendingError::Eligibility(format!(
            "Your TrustIndex of {} makes you ineligible for a loan of amount {}. Your maximum eligible amount is {}.",
            receiver.trust_index, brochure.amount, max_loan
        )));
    }

    Ok(())
}

/// Decide whether `receiver` may nominate `guarantor_id`
pub fn validate_guarantor_nomination(receiver: &User, guarantor_id: Uuid) -> LendingResult<()> {
    if receiver.id == guarantor_id {
        return Err(LendingError::validation(
            "You cannot nominate yourself as guarantor.",
        ));
    }

    if !receiver.is_endorsed_by(guarantor_id) {
        return Err(LendingError::Eligibility(
            "A guarantor must have endorsed you before they can be nominated.".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brochure(amount: i64) -> LoanBrochure {
        LoanBrochure::new(Uuid::new_v4(), amount, 1_000, 90)
    }

    #[test]
    fn test_accepts_brochure_within_limit() {
        let receiver = User::new("ravi", 450);
        let b = brochure(10_000);
        let actor = Actor::receiver(receiver.id);
        assert!(validate_request_creation(&actor, &receiver, &[b.id], &[b.clone()], false).is_ok());
    }

    #[test]
    fn test_rejects_amount_over_limit_with_limit_in_message() {
        let receiver = User::new("ravi", 450);
        let b = brochure(20_000);
        let actor = Actor::receiver(receiver.id);
        let err = validate_request_creation(&actor, &receiver, &[b.id], &[b.clone()], false)
            .unwrap_err();
        match err {
            LendingError::Eligibility(message) => {
                assert!(message.contains("10000"), "message was: {}", message)
            }
            other => panic!("expected eligibility error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_role_is_role_error() {
        let receiver = User::new("ravi", 450);
        let b = brochure(1_000);
        let actor = Actor::lender(receiver.id);
        let err = validate_request_creation(&actor, &receiver, &[b.id], &[b.clone()], false)
            .unwrap_err();
        assert!(matches!(err, LendingError::Role(_)));
    }

    #[test]
    fn test_brochure_count_bounds() {
        let receiver = User::new("ravi", 900);
        let actor = Actor::receiver(receiver.id);
        let err = validate_request_creation(&actor, &receiver, &[], &[], false).unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));

        let four: Vec<LoanBrochure> = (0..4).map(|_| brochure(1_000)).collect();
        let ids: Vec<Uuid> = four.iter().map(|b| b.id).collect();
        let err = validate_request_creation(&actor, &receiver, &ids, &four, false).unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));
    }

    #[test]
    fn test_inactive_or_unknown_brochure_rejected() {
        let receiver = User::new("ravi", 900);
        let actor = Actor::receiver(receiver.id);
        let mut inactive = brochure(1_000);
        inactive.active = false;
        let err = validate_request_creation(&actor, &receiver, &[inactive.id], &[inactive.clone()], false)
            .unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));

        let err = validate_request_creation(&actor, &receiver, &[Uuid::new_v4()], &[], false)
            .unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));
    }

    #[test]
    fn test_active_request_is_conflict() {
        let receiver = User::new("ravi", 900);
        let b = brochure(1_000);
        let actor = Actor::receiver(receiver.id);
        let err = validate_request_creation(&actor, &receiver, &[b.id], &[b.clone()], true)
            .unwrap_err();
        assert!(matches!(err, LendingError::Conflict(_)));
    }

    #[test]
    fn test_self_nomination_rejected() {
        let receiver = User::new("ravi", 900);
        let receiver = receiver.clone().with_endorsement_from(receiver.id);
        assert!(validate_guarantor_nomination(&receiver, receiver.id).is_err());
    }

    #[test]
    fn test_nomination_requires_endorsement() {
        let guarantor = Uuid::new_v4();
        let receiver = User::new("ravi", 900);
        assert!(validate_guarantor_nomination(&receiver, guarantor).is_err());

        let receiver = receiver.with_endorsement_from(guarantor);
        assert!(validate_guarantor_nomination(&receiver, guarantor).is_ok());
    }
}
