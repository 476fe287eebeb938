//! Loan request and guarantor workflow tests

mod common;

use common::{Fixture, RECEIVER_TRUST_INDEX};
use trustlend_server::error::LendingError;
use trustlend_server::loan_request::{
    GuarantorRequestStatus, GuarantorResponse, LoanRequestStatus,
};
use trustlend_server::models::{Actor, User};
use trustlend_server::services::max_loan_limit;
use uuid::Uuid;

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_opens_linked_pair() {
    let fx = Fixture::new();
    let record = fx.open_request().await;

    assert_eq!(record.loan_request.status, LoanRequestStatus::Pending);
    assert_eq!(
        record.guarantor_request.status,
        GuarantorRequestStatus::Pending
    );
    assert_eq!(record.guarantor_request.loan_request_id, record.loan_request.id);
    assert_eq!(record.loan_request.brochure_ids, vec![fx.brochure.id]);

    let mine = fx.requests.list_mine(fx.receiver_actor()).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn test_second_active_request_is_conflict() {
    let fx = Fixture::new();
    fx.open_request().await;

    let err = fx
        .requests
        .create(fx.receiver_actor(), fx.request_body(vec![fx.brochure.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Conflict(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_leave_one_request() {
    let fx = Fixture::new();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let requests = fx.requests.clone();
            let actor = fx.receiver_actor();
            let body = fx.request_body(vec![fx.brochure.id]);
            tokio::spawn(async move { requests.create(actor, body).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(matches!(e, LendingError::Conflict(_)), "got {:?}", e),
        }
    }
    assert_eq!(created, 1);

    let mine = fx.requests.list_mine(fx.receiver_actor()).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn test_over_limit_reports_limit() {
    let fx = Fixture::new();
    let big = fx.add_brochure(20_000);

    let err = fx
        .requests
        .create(fx.receiver_actor(), fx.request_body(vec![big.id]))
        .await
        .unwrap_err();

    let limit = max_loan_limit(RECEIVER_TRUST_INDEX);
    assert_eq!(limit, 10_000);
    match err {
        LendingError::Eligibility(message) => assert!(message.contains(&limit.to_string())),
        other => panic!("expected eligibility error, got {:?}", other),
    }
    assert!(fx
        .requests
        .list_mine(fx.receiver_actor())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_only_receivers_create_requests() {
    let fx = Fixture::new();
    let err = fx
        .requests
        .create(
            Actor::lender(fx.receiver.id),
            fx.request_body(vec![fx.brochure.id]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Role(_)));
}

#[tokio::test]
async fn test_brochure_count_and_existence() {
    let fx = Fixture::new();

    let err = fx
        .requests
        .create(fx.receiver_actor(), fx.request_body(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Validation(_)));

    let four = (0..4).map(|_| fx.add_brochure(500).id).collect();
    let err = fx
        .requests
        .create(fx.receiver_actor(), fx.request_body(four))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Validation(_)));

    let err = fx
        .requests
        .create(fx.receiver_actor(), fx.request_body(vec![Uuid::new_v4()]))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Validation(_)));
}

#[tokio::test]
async fn test_guarantor_nomination_rules() {
    let fx = Fixture::new();

    let mut body = fx.request_body(vec![fx.brochure.id]);
    body.guarantor_id = fx.receiver.id;
    let err = fx
        .requests
        .create(fx.receiver_actor(), body)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Validation(_)));

    let stranger = User::new("Stranger", 600);
    fx.store.insert_user(stranger.clone());
    let mut body = fx.request_body(vec![fx.brochure.id]);
    body.guarantor_id = stranger.id;
    let err = fx
        .requests
        .create(fx.receiver_actor(), body)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Eligibility(_)));
}

// ============================================================================
// Guarantor answers
// ============================================================================

#[tokio::test]
async fn test_accept_advances_request() {
    let fx = Fixture::new();
    let record = fx.open_request().await;

    let pending = fx.requests.list_pending(fx.guarantor_actor()).await.unwrap();
    assert_eq!(pending.len(), 1);

    let answered = fx
        .requests
        .respond(
            fx.guarantor_actor(),
            record.guarantor_request.id,
            GuarantorResponse::Accepted,
        )
        .await
        .unwrap();
    assert_eq!(answered.status, GuarantorRequestStatus::Accepted);

    let request = fx
        .requests
        .get_loan_request(fx.receiver_actor(), record.loan_request.id)
        .await
        .unwrap();
    assert_eq!(request.status, LoanRequestStatus::GuarantorAccepted);
    assert!(fx
        .requests
        .list_pending(fx.guarantor_actor())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_responding_twice_is_state_error() {
    let fx = Fixture::new();
    let record = fx.open_request().await;
    fx.requests
        .respond(
            fx.guarantor_actor(),
            record.guarantor_request.id,
            GuarantorResponse::Declined,
        )
        .await
        .unwrap();

    let err = fx
        .requests
        .respond(
            fx.guarantor_actor(),
            record.guarantor_request.id,
            GuarantorResponse::Accepted,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::State(_)));
}

#[tokio::test]
async fn test_only_nominated_guarantor_responds() {
    let fx = Fixture::new();
    let record = fx.open_request().await;
    let err = fx
        .requests
        .respond(
            Actor::guarantor(Uuid::new_v4()),
            record.guarantor_request.id,
            GuarantorResponse::Accepted,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Role(_)));

    let err = fx
        .requests
        .get_guarantor_request(Actor::lender(Uuid::new_v4()), record.guarantor_request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Role(_)));
}

#[tokio::test]
async fn test_unknown_guarantor_request_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .requests
        .get_guarantor_request(fx.guarantor_actor(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::NotFound(_)));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_frees_receiver_for_new_request() {
    let fx = Fixture::new();
    let record = fx.guaranteed_request().await;

    let cancelled = fx
        .requests
        .cancel(fx.receiver_actor(), record.loan_request.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, LoanRequestStatus::Cancelled);

    fx.open_request().await;
}

#[tokio::test]
async fn test_cancel_rejected_once_contracting() {
    let fx = Fixture::new();
    let contract = fx.drafted_contract().await;

    let err = fx
        .requests
        .cancel(fx.receiver_actor(), contract.loan_request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::State(_)));
}

#[tokio::test]
async fn test_cancel_by_someone_else_is_rejected() {
    let fx = Fixture::new();
    let record = fx.open_request().await;
    let err = fx
        .requests
        .cancel(Actor::receiver(Uuid::new_v4()), record.loan_request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::State(_)));
}

#[tokio::test]
async fn test_decline_closes_request_and_frees_receiver() {
    let fx = Fixture::new();
    let record = fx.open_request().await;
    fx.requests
        .respond(
            fx.guarantor_actor(),
            record.guarantor_request.id,
            GuarantorResponse::Declined,
        )
        .await
        .unwrap();

    let mine = fx.requests.list_mine(fx.receiver_actor()).await.unwrap();
    assert_eq!(mine[0].status, LoanRequestStatus::Cancelled);

    // A fresh request is allowed straight away
    let again = fx.open_request().await;
    assert_eq!(again.loan_request.status, LoanRequestStatus::Pending);
}

// ============================================================================
// Lender view
// ============================================================================

#[tokio::test]
async fn test_lender_sees_guaranteed_requests_on_own_brochures() {
    let fx = Fixture::new();
    let record = fx.open_request().await;

    // Not listed until the guarantor accepts
    let incoming = fx.requests.list_for_lender(fx.lender_actor()).await.unwrap();
    assert!(incoming.is_empty());

    fx.requests
        .respond(
            fx.guarantor_actor(),
            record.guarantor_request.id,
            GuarantorResponse::Accepted,
        )
        .await
        .unwrap();

    let incoming = fx.requests.list_for_lender(fx.lender_actor()).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, record.loan_request.id);

    let other_lender = User::new("Other lender", 800);
    fx.store.insert_user(other_lender.clone());
    let incoming = fx
        .requests
        .list_for_lender(Actor::lender(other_lender.id))
        .await
        .unwrap();
    assert!(incoming.is_empty());

    let err = fx
        .requests
        .list_for_lender(fx.receiver_actor())
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Role(_)));
}
