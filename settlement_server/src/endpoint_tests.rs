//! Endpoint tests: routing, authorization, and the webhook delivery surface, against the engine's scripted
//! processor and a throwaway database.

use actix_web::{
    http::StatusCode,
    test::{call_service, init_service, read_body_json, TestRequest},
    web,
    App,
};
use chrono::Utc;
use mps_common::{MinorUnits, Secret};
use processor_tools::webhook::{sign, SIGNATURE_HEADER};
use serde_json::json;
use settlement_engine::{
    commission::CommissionSchedule,
    db_types::PurchaseStatus,
    events::EventProducers,
    test_utils::{prepare_test_db, seed_verified_payee, MockProcessor},
    DisputeApi,
    PayeeApi,
    RefundApi,
    SettlementDatabase,
    SettlementFlowApi,
    SqliteDatabase,
    WebhookReconciler,
};

use crate::{
    auth::{USER_ID_HEADER, USER_ROLES_HEADER},
    routes::{
        begin_onboarding,
        cancel_refund,
        create_purchase,
        create_reauth_link,
        dispute_by_id,
        earnings,
        health,
        my_payee_account,
        payments_webhook,
        purchase_by_id,
        refresh_payee_account,
        refund_by_id,
        request_refund,
        submit_dispute_evidence,
    },
};

const SECRET: &str = "whsec_endpoint_tests";

/// Builds the same service tree as the production server, with the mock processor riding in the client seat.
macro_rules! test_app {
    ($db:expr, $mock:expr) => {{
        let db = $db.clone();
        let mock = $mock.clone();
        init_service(
            App::new()
                .app_data(web::Data::new(PayeeApi::new(db.clone(), mock.clone())))
                .app_data(web::Data::new(SettlementFlowApi::new(
                    db.clone(),
                    mock.clone(),
                    CommissionSchedule::default(),
                )))
                .app_data(web::Data::new(RefundApi::new(db.clone(), mock.clone())))
                .app_data(web::Data::new(DisputeApi::new(db.clone(), mock.clone())))
                .app_data(web::Data::new(WebhookReconciler::new(
                    db.clone(),
                    mock.clone(),
                    Secret::new(SECRET.to_string()),
                    EventProducers::default(),
                )))
                .service(health)
                .service(
                    web::scope("/api")
                        .route("/payees/onboarding", web::post().to(begin_onboarding::<SqliteDatabase, MockProcessor>))
                        .route("/payees/me", web::get().to(my_payee_account::<SqliteDatabase, MockProcessor>))
                        .route(
                            "/payees/me/refresh",
                            web::post().to(refresh_payee_account::<SqliteDatabase, MockProcessor>),
                        )
                        .route(
                            "/payees/me/reauth_link",
                            web::post().to(create_reauth_link::<SqliteDatabase, MockProcessor>),
                        )
                        .route("/payees/{owner_id}/earnings", web::get().to(earnings::<SqliteDatabase, MockProcessor>))
                        .route("/purchases", web::post().to(create_purchase::<SqliteDatabase, MockProcessor>))
                        .route("/purchases/{id}", web::get().to(purchase_by_id::<SqliteDatabase, MockProcessor>))
                        .route("/refunds", web::post().to(request_refund::<SqliteDatabase, MockProcessor>))
                        .route("/refunds/{id}", web::get().to(refund_by_id::<SqliteDatabase, MockProcessor>))
                        .route("/refunds/{id}/cancel", web::post().to(cancel_refund::<SqliteDatabase, MockProcessor>))
                        .route("/disputes/{id}", web::get().to(dispute_by_id::<SqliteDatabase, MockProcessor>))
                        .route(
                            "/disputes/{id}/evidence",
                            web::post().to(submit_dispute_evidence::<SqliteDatabase, MockProcessor>),
                        ),
                )
                .service(
                    web::scope("/webhooks")
                        .route("/payments", web::post().to(payments_webhook::<SqliteDatabase, MockProcessor>)),
                ),
        )
        .await
    }};
}

fn as_user(req: TestRequest, user_id: &str) -> TestRequest {
    req.insert_header((USER_ID_HEADER, user_id)).insert_header((USER_ROLES_HEADER, "user"))
}

fn as_admin(req: TestRequest, user_id: &str) -> TestRequest {
    req.insert_header((USER_ID_HEADER, user_id)).insert_header((USER_ROLES_HEADER, "user,admin"))
}

#[actix_web::test]
async fn health_check_is_open() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let app = test_app!(db, mock);
    let resp = call_service(&app, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn purchases_require_an_authenticated_identity() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let app = test_app!(db, mock);
    let req = TestRequest::post()
        .uri("/api/purchases")
        .set_json(json!({
            "app_id": "app_1",
            "payee_id": "dev_1",
            "amount": 10000,
            "buyer_email": "buyer@example.com"
        }))
        .to_request();
    let resp = call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn a_buyer_gets_a_client_secret_back() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    seed_verified_payee(&db, "dev_1", "acct_dev_1").await;
    let app = test_app!(db, mock);
    let req = as_user(TestRequest::post(), "buyer_1")
        .uri("/api/purchases")
        .set_json(json!({
            "app_id": "app_1",
            "payee_id": "dev_1",
            "amount": 10000,
            "buyer_email": "buyer@example.com"
        }))
        .to_request();
    let resp = call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = read_body_json(resp).await;
    assert!(body["client_secret"].as_str().is_some());
    assert_eq!(body["purchase"]["status"], "pending");
    assert_eq!(body["purchase"]["payee_amount"], 7744);
}

#[actix_web::test]
async fn earnings_are_visible_to_the_owner_and_admins_only() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    seed_verified_payee(&db, "dev_1", "acct_dev_1").await;
    let app = test_app!(db, mock);

    let own = as_user(TestRequest::get(), "dev_1").uri("/api/payees/dev_1/earnings").to_request();
    assert_eq!(call_service(&app, own).await.status(), StatusCode::OK);

    let admin = as_admin(TestRequest::get(), "ops_1").uri("/api/payees/dev_1/earnings").to_request();
    assert_eq!(call_service(&app, admin).await.status(), StatusCode::OK);

    let snoop = as_user(TestRequest::get(), "dev_2").uri("/api/payees/dev_1/earnings").to_request();
    assert_eq!(call_service(&app, snoop).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn refund_requests_are_admin_only() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let app = test_app!(db, mock);
    let req = as_user(TestRequest::post(), "dev_1")
        .uri("/api/refunds")
        .set_json(json!({ "purchase_id": 1, "reason": "requested_by_customer" }))
        .to_request();
    let resp = call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn onboarding_returns_a_hosted_flow_link() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let app = test_app!(db, mock);
    let req = as_user(TestRequest::post(), "dev_9")
        .uri("/api/payees/onboarding")
        .set_json(json!({ "email": "dev9@example.com", "country": "US" }))
        .to_request();
    let resp = call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = read_body_json(resp).await;
    assert_eq!(body["owner_id"], "dev_9");
    assert!(body["onboarding_url"].as_str().is_some());

    // The account is mirrored locally and visible to its owner.
    let me = as_user(TestRequest::get(), "dev_9").uri("/api/payees/me").to_request();
    let resp = call_service(&app, me).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = read_body_json(resp).await;
    assert_eq!(body["verification_status"], "pending");
}

#[actix_web::test]
async fn a_signed_webhook_settles_the_purchase() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    seed_verified_payee(&db, "dev_1", "acct_dev_1").await;
    let flow = SettlementFlowApi::new(db.clone(), mock.clone(), CommissionSchedule::default());
    let result = flow
        .create_purchase_intent("buyer_1", "app_1", "dev_1", MinorUnits::from(10000), "buyer@example.com")
        .await
        .unwrap();
    let app = test_app!(db, mock);

    let body = json!({
        "id": "evt_http_1",
        "type": "payment_intent.succeeded",
        "created": Utc::now().timestamp(),
        "data": { "object": {
            "id": result.payment_intent_id.to_string(),
            "amount": 10000,
            "currency": "usd",
            "status": "succeeded",
        }}
    })
    .to_string();
    let header = sign(SECRET, Utc::now(), &body);
    let req = TestRequest::post()
        .uri("/webhooks/payments")
        .insert_header((SIGNATURE_HEADER, header))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let purchase = db.fetch_purchase(result.purchase.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Completed);
}

#[actix_web::test]
async fn an_unsigned_webhook_is_rejected() {
    let db = prepare_test_db().await;
    let mock = MockProcessor::new();
    let app = test_app!(db, mock);

    let body = json!({
        "id": "evt_forged",
        "type": "payment_intent.succeeded",
        "created": Utc::now().timestamp(),
        "data": { "object": { "id": "pi_1", "amount": 1, "currency": "usd", "status": "succeeded" }}
    })
    .to_string();
    let header = sign("whsec_attacker", Utc::now(), &body);
    let req = TestRequest::post()
        .uri("/webhooks/payments")
        .insert_header((SIGNATURE_HEADER, header))
        .set_payload(body)
        .to_request();
    let resp = call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let missing = TestRequest::post().uri("/webhooks/payments").set_payload("{}").to_request();
    let resp = call_service(&app, missing).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
