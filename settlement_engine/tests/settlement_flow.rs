//! End-to-end tests for the purchase flow: eligibility gate, split wiring, and processor failure handling.

use mps_common::MinorUnits;
use settlement_engine::{
    commission::CommissionSchedule,
    db_types::{AccountType, NewPayeeAccount, PurchaseStatus},
    test_utils::{prepare_test_db, seed_verified_payee, MockProcessor},
    PayeeAccountManagement,
    PaymentEngineError,
    SettlementDatabase,
    SettlementError,
    SettlementFlowApi,
};

#[tokio::test]
async fn purchase_intent_carries_the_server_computed_split() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    seed_verified_payee(&db, "dev_1", "acct_dev_1").await;
    let api = SettlementFlowApi::new(db.clone(), mock.clone(), CommissionSchedule::default());

    let result = api
        .create_purchase_intent("buyer_1", "app_1", "dev_1", MinorUnits::from(10000), "buyer@example.com")
        .await
        .expect("purchase intent should be created");

    let purchase = &result.purchase;
    assert_eq!(purchase.status, PurchaseStatus::Pending);
    assert_eq!(purchase.gross_amount, MinorUnits::from(10000));
    assert_eq!(purchase.processor_fee, MinorUnits::from(320));
    assert_eq!(purchase.platform_fee, MinorUnits::from(1936));
    assert_eq!(purchase.payee_amount, MinorUnits::from(7744));
    assert_eq!(purchase.payment_intent_id, Some(result.payment_intent_id.clone()));
    assert!(result.client_secret.is_some());

    let intents = mock.created_intents();
    assert_eq!(intents.len(), 1);
    let intent = &intents[0];
    // The destination receives exactly the payee amount: gross minus the application fee.
    assert_eq!(intent.application_fee_amount, Some(MinorUnits::from(320 + 1936)));
    assert_eq!(intent.transfer_destination.as_deref(), Some("acct_dev_1"));
    assert_eq!(intent.metadata.get("purchase_id"), Some(&purchase.id.to_string()));
}

#[tokio::test]
async fn ineligible_payee_creates_no_ledger_row() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    // Payee exists but never completed onboarding, so charges are not enabled.
    db.upsert_payee_account(NewPayeeAccount {
        owner_id: "dev_2".to_string(),
        processor_account_id: "acct_dev_2".to_string(),
        account_type: AccountType::Express,
    })
    .await
    .unwrap();
    let api = SettlementFlowApi::new(db.clone(), mock.clone(), CommissionSchedule::default());

    let err = api
        .create_purchase_intent("buyer_1", "app_1", "dev_2", MinorUnits::from(5000), "buyer@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEngineError::Settlement(SettlementError::PayeeNotEligible(_))));
    // Nothing reached the processor and nothing was written.
    assert!(mock.created_intents().is_empty());
    assert!(db.fetch_purchase(1).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_payee_is_rejected() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let api = SettlementFlowApi::new(db, MockProcessor::new(), CommissionSchedule::default());
    let err = api
        .create_purchase_intent("buyer_1", "app_1", "nobody", MinorUnits::from(5000), "buyer@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEngineError::Settlement(SettlementError::PayeeNotFound(_))));
}

#[tokio::test]
async fn sub_minimum_charge_is_rejected_before_any_io() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let api = SettlementFlowApi::new(db, mock.clone(), CommissionSchedule::default());
    let err = api
        .create_purchase_intent("buyer_1", "app_1", "dev_1", MinorUnits::from(25), "buyer@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentEngineError::ValidationError(_)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn processor_timeout_leaves_a_failed_purchase_not_an_ambiguous_one() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    seed_verified_payee(&db, "dev_3", "acct_dev_3").await;
    let api = SettlementFlowApi::new(db.clone(), mock.clone(), CommissionSchedule::default());

    mock.fail_next_call();
    let err = api
        .create_purchase_intent("buyer_9", "app_1", "dev_3", MinorUnits::from(8000), "buyer9@example.com")
        .await
        .unwrap_err();
    match err {
        PaymentEngineError::ExternalServiceError { retryable, .. } => assert!(retryable),
        other => panic!("expected an external service error, got {other}"),
    }
    let purchase = db.fetch_purchase(1).await.unwrap().expect("the ledger row should exist");
    assert_eq!(purchase.status, PurchaseStatus::Failed);
    assert!(purchase.failure_reason.is_some());
    assert!(purchase.payment_intent_id.is_none());
}

#[tokio::test]
async fn earnings_reflect_settled_pending_and_disputed_purchases() {
    let _ = env_logger::try_init();
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    seed_verified_payee(&db, "dev_4", "acct_dev_4").await;
    let api = SettlementFlowApi::new(db.clone(), mock.clone(), CommissionSchedule::default());

    let first = api
        .create_purchase_intent("buyer_1", "app_1", "dev_4", MinorUnits::from(10000), "b1@example.com")
        .await
        .unwrap();
    let _second = api
        .create_purchase_intent("buyer_2", "app_1", "dev_4", MinorUnits::from(6000), "b2@example.com")
        .await
        .unwrap();
    db.mark_completed(&first.payment_intent_id, chrono::Utc::now(), None).await.unwrap();

    let earnings = api.get_earnings("dev_4").await.unwrap();
    assert_eq!(earnings.purchase_count, 2);
    assert_eq!(earnings.settled_gross, MinorUnits::from(10000));
    assert_eq!(earnings.settled_payee_amount, MinorUnits::from(7744));
    // The second purchase is still waiting on its webhook.
    assert!(earnings.pending_payee_amount.is_positive());
    assert_eq!(earnings.refunded_amount, MinorUnits::from(0));
}
