//! Refund and dispute lifecycle tests against a migrated database and a scripted processor.

use chrono::{Duration, Utc};
use mps_common::MinorUnits;
use processor_tools::data_objects::{DisputeEvidence, ProcessorDispute};
use settlement_engine::{
    commission::CommissionSchedule,
    db_types::{DisputeStatus, Purchase, PurchaseStatus, RefundReason, RefundStatus},
    test_utils::{prepare_test_db, seed_verified_payee, MockProcessor},
    DisputeApi,
    PaymentEngineError,
    RefundApi,
    SettlementDatabase,
    SettlementError,
    SettlementFlowApi,
    SqliteDatabase,
};

async fn completed_purchase(db: &SqliteDatabase, mock: &MockProcessor, buyer: &str) -> Purchase {
    seed_verified_payee(db, "dev_1", "acct_dev_1").await;
    let api = SettlementFlowApi::new(db.clone(), mock.clone(), CommissionSchedule::default());
    let result = api
        .create_purchase_intent(buyer, "app_1", "dev_1", MinorUnits::from(10000), &format!("{buyer}@example.com"))
        .await
        .unwrap();
    db.mark_completed(&result.payment_intent_id, Utc::now(), None).await.unwrap()
}

#[tokio::test]
async fn full_refund_settles_the_purchase_as_refunded() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_1").await;
    let api = RefundApi::new(db.clone(), mock.clone());

    // No amount given: defaults to the full remaining balance.
    let refund = api.request_refund(purchase.id, None, RefundReason::RequestedByCustomer, "admin_1").await.unwrap();
    assert_eq!(refund.status, RefundStatus::Pending);
    assert_eq!(refund.amount, purchase.gross_amount);

    // The purchase is untouched until the processor confirms.
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Completed);

    db.apply_refund_status(&refund.processor_refund_id, RefundStatus::Succeeded, Utc::now(), None).await.unwrap();
    let purchase = db.fetch_purchase(purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Refunded);

    // A fully refunded purchase cannot be refunded again.
    let err = api.request_refund(purchase.id, None, RefundReason::Other, "admin_1").await.unwrap_err();
    assert!(matches!(err, PaymentEngineError::Settlement(SettlementError::PurchaseNotRefundable(_))));
}

#[tokio::test]
async fn partial_refunds_respect_the_cumulative_bound() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_2").await;
    let api = RefundApi::new(db.clone(), mock.clone());

    let first = api
        .request_refund(purchase.id, Some(MinorUnits::from(4000)), RefundReason::Duplicate, "admin_1")
        .await
        .unwrap();
    db.apply_refund_status(&first.processor_refund_id, RefundStatus::Succeeded, Utc::now(), None).await.unwrap();
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::PartiallyRefunded);

    // Only 6000 remains refundable.
    let err = api
        .request_refund(purchase.id, Some(MinorUnits::from(7000)), RefundReason::Other, "admin_1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEngineError::Settlement(SettlementError::InvalidAmount(_))));

    let second =
        api.request_refund(purchase.id, Some(MinorUnits::from(6000)), RefundReason::Other, "admin_1").await.unwrap();
    db.apply_refund_status(&second.processor_refund_id, RefundStatus::Succeeded, Utc::now(), None).await.unwrap();
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn repeated_refunds_of_the_same_amount_are_distinct_requests() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_9").await;
    let api = RefundApi::new(db.clone(), mock.clone());

    // Same purchase, same admin, same amount, twice. The processor deduplicates on the idempotency key, so the
    // two requests must carry different keys or the second would silently come back as the first.
    let first =
        api.request_refund(purchase.id, Some(MinorUnits::from(2000)), RefundReason::Other, "admin_1").await.unwrap();
    let second =
        api.request_refund(purchase.id, Some(MinorUnits::from(2000)), RefundReason::Other, "admin_1").await.unwrap();
    assert_ne!(first.processor_refund_id, second.processor_refund_id);
    assert_ne!(first.id, second.id);

    let committed = db.refunded_total(purchase.id, &[RefundStatus::Pending]).await.unwrap();
    assert_eq!(committed, MinorUnits::from(4000));
}

#[tokio::test]
async fn pending_refunds_count_against_the_requestable_balance() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_3").await;
    let api = RefundApi::new(db.clone(), mock.clone());

    api.request_refund(purchase.id, Some(MinorUnits::from(9000)), RefundReason::Other, "admin_1").await.unwrap();
    // A second admin cannot queue a refund that would overlap with the pending one.
    let err = api
        .request_refund(purchase.id, Some(MinorUnits::from(2000)), RefundReason::Other, "admin_2")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEngineError::Settlement(SettlementError::InvalidAmount(_))));
}

#[tokio::test]
async fn refund_cancellation_requires_processor_confirmation_and_a_pending_row() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_4").await;
    let api = RefundApi::new(db.clone(), mock.clone());

    let refund = api.request_refund(purchase.id, None, RefundReason::Other, "admin_1").await.unwrap();
    let cancelled = api.cancel_refund(refund.id, "admin_1").await.unwrap();
    assert_eq!(cancelled.status, RefundStatus::Canceled);
    // Cancelled refunds never touch the purchase.
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Completed);

    // A decided refund can no longer be cancelled.
    let err = api.cancel_refund(refund.id, "admin_1").await.unwrap_err();
    assert!(matches!(err, PaymentEngineError::RefundNotCancellable(RefundStatus::Canceled)));
}

fn dispute_for(purchase: &Purchase, dispute_id: &str, status: &str) -> ProcessorDispute {
    ProcessorDispute {
        id: dispute_id.to_string(),
        payment_intent: purchase.payment_intent_id.clone().map(|id| id.0).unwrap_or_default(),
        amount: purchase.gross_amount,
        reason: Some("fraudulent".to_string()),
        status: status.to_string(),
        evidence_due_by: Some(Utc::now() + Duration::days(7)),
    }
}

#[tokio::test]
async fn dispute_won_restores_the_prior_settlement_status() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_5").await;
    let api = DisputeApi::new(db.clone(), mock.clone());

    let opened = dispute_for(&purchase, "dp_1", "needs_response");
    let (case, created) = api.on_dispute_opened(&opened, Utc::now(), None).await.unwrap();
    assert!(created);
    assert_eq!(case.status, DisputeStatus::NeedsResponse);
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Disputed);

    // Redelivery of the open event changes nothing.
    let (_, created) = api.on_dispute_opened(&opened, Utc::now(), None).await.unwrap();
    assert!(!created);

    let closed = dispute_for(&purchase, "dp_1", "won");
    let case = api.on_dispute_closed(&closed, Utc::now(), None).await.unwrap();
    assert_eq!(case.status, DisputeStatus::Won);
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Completed);

    // Terminal means terminal.
    let reopened = dispute_for(&purchase, "dp_1", "under_review");
    let err =
        db.update_dispute_status(&reopened.id, DisputeStatus::UnderReview, None, Utc::now(), None).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));
}

#[tokio::test]
async fn dispute_lost_forfeits_the_purchase() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_6").await;
    let api = DisputeApi::new(db.clone(), mock.clone());

    let opened = dispute_for(&purchase, "dp_2", "needs_response");
    api.on_dispute_opened(&opened, Utc::now(), None).await.unwrap();
    let closed = dispute_for(&purchase, "dp_2", "lost");
    let case = api.on_dispute_closed(&closed, Utc::now(), None).await.unwrap();
    assert_eq!(case.status, DisputeStatus::Lost);
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Disputed);
}

#[tokio::test]
async fn dispute_decision_is_recorded_even_after_a_refund_settles_the_purchase() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_10").await;
    let api = DisputeApi::new(db.clone(), mock.clone());

    let opened = dispute_for(&purchase, "dp_5", "needs_response");
    api.on_dispute_opened(&opened, Utc::now(), None).await.unwrap();

    // The customer is made whole by a refund while the dispute is still open.
    let refunds = RefundApi::new(db.clone(), mock.clone());
    let refund = refunds.request_refund(purchase.id, None, RefundReason::RequestedByCustomer, "admin_1").await.unwrap();
    db.apply_refund_status(&refund.processor_refund_id, RefundStatus::Succeeded, Utc::now(), None).await.unwrap();
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Refunded);

    // The decision still lands; the purchase keeps the settlement status the refund gave it.
    let closed = dispute_for(&purchase, "dp_5", "lost");
    let case = api.on_dispute_closed(&closed, Utc::now(), None).await.unwrap();
    assert_eq!(case.status, DisputeStatus::Lost);
    assert_eq!(db.fetch_purchase(purchase.id).await.unwrap().unwrap().status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn evidence_is_refused_after_the_window_closes() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_7").await;
    let api = DisputeApi::new(db.clone(), mock.clone());

    let mut opened = dispute_for(&purchase, "dp_3", "needs_response");
    opened.evidence_due_by = Some(Utc::now() - Duration::hours(1));
    let (case, _) = api.on_dispute_opened(&opened, Utc::now(), None).await.unwrap();

    let err = api.submit_evidence(case.id, &DisputeEvidence::default()).await.unwrap_err();
    assert!(matches!(err, PaymentEngineError::EvidenceWindowClosed { .. }));
}

#[tokio::test]
async fn evidence_submission_mirrors_the_processor_state() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let purchase = completed_purchase(&db, &mock, "buyer_8").await;
    let api = DisputeApi::new(db.clone(), mock.clone());

    let opened = dispute_for(&purchase, "dp_4", "needs_response");
    mock.seed_dispute(opened.clone());
    let (case, _) = api.on_dispute_opened(&opened, Utc::now(), None).await.unwrap();

    let evidence = DisputeEvidence {
        product_description: Some("Pro plan, 12 months".to_string()),
        customer_email_address: Some("buyer_8@example.com".to_string()),
        ..DisputeEvidence::default()
    };
    let case = api.submit_evidence(case.id, &evidence).await.unwrap();
    assert_eq!(case.status, DisputeStatus::UnderReview);
}
