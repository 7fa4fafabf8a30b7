use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use settlement_engine::{
    events::{DisputeClosedEvent, EventHandlers, EventHooks, EventProducers, PurchaseSettledEvent, RefundSettledEvent},
    DisputeApi,
    PayeeApi,
    RefundApi,
    SettlementDatabase,
    SettlementFlowApi,
    SqliteDatabase,
    WebhookReconciler,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::PaymentGateway,
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

const EVENT_BUFFER_SIZE: usize = 50;
/// How long webhook dedup records are kept. Must comfortably exceed the processor's redelivery window.
const SEEN_EVENT_RETENTION_DAYS: i64 = 30;
const PURGE_INTERVAL: Duration = Duration::from_secs(12 * 3600);

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let client = PaymentGateway::new(&config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, default_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    if config.purge_seen_events {
        start_seen_event_purge(db.clone());
    }
    let srv = create_server_instance(config, db, client, producers)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

/// Housekeeping for the webhook dedup table.
fn start_seen_event_purge(db: SqliteDatabase) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match db.purge_seen_events(chrono::Duration::days(SEEN_EVENT_RETENTION_DAYS)).await {
                Ok(purged) if purged > 0 => info!("🗃️ Purged {purged} old webhook dedup records"),
                Ok(_) => {},
                Err(e) => warn!("🗃️ Seen-event purge failed: {e}"),
            }
        }
    });
}

/// The out-of-the-box event hooks just narrate settlement activity. Deployments that deliver receipts or ping a
/// payout service replace these with their own.
fn default_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_purchase_settled(|ev: PurchaseSettledEvent| {
        Box::pin(async move {
            info!("📬️ Purchase #{} settled. Payee {} earned {}.", ev.purchase.id, ev.purchase.payee_id, ev.purchase.payee_amount);
        })
    });
    hooks.on_refund_settled(|ev: RefundSettledEvent| {
        Box::pin(async move {
            info!("📬️ Refund {} of {} settled against purchase #{}.", ev.refund.processor_refund_id, ev.refund.amount, ev.purchase.id);
        })
    });
    hooks.on_dispute_closed(|ev: DisputeClosedEvent| {
        Box::pin(async move {
            info!("📬️ Dispute {} closed with outcome {}.", ev.dispute.processor_dispute_id, ev.outcome);
        })
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    client: PaymentGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let payees_api = PayeeApi::new(db.clone(), client.clone());
        let settlement_api = SettlementFlowApi::new(db.clone(), client.clone(), config.commission);
        let refunds_api = RefundApi::new(db.clone(), client.clone());
        let disputes_api = DisputeApi::new(db.clone(), client.clone());
        let reconciler = WebhookReconciler::new(
            db.clone(),
            client.clone(),
            config.processor.webhook_secret.clone(),
            producers.clone(),
        );
        let api_scope = web::scope("/api")
            .route("/payees/onboarding", web::post().to(begin_onboarding::<SqliteDatabase, PaymentGateway>))
            .route("/payees/me", web::get().to(my_payee_account::<SqliteDatabase, PaymentGateway>))
            .route("/payees/me/refresh", web::post().to(refresh_payee_account::<SqliteDatabase, PaymentGateway>))
            .route("/payees/me/reauth_link", web::post().to(create_reauth_link::<SqliteDatabase, PaymentGateway>))
            .route("/payees/{owner_id}/earnings", web::get().to(earnings::<SqliteDatabase, PaymentGateway>))
            .route("/purchases", web::post().to(create_purchase::<SqliteDatabase, PaymentGateway>))
            .route("/purchases/{id}", web::get().to(purchase_by_id::<SqliteDatabase, PaymentGateway>))
            .route("/refunds", web::post().to(request_refund::<SqliteDatabase, PaymentGateway>))
            .route("/refunds/{id}", web::get().to(refund_by_id::<SqliteDatabase, PaymentGateway>))
            .route("/refunds/{id}/cancel", web::post().to(cancel_refund::<SqliteDatabase, PaymentGateway>))
            .route("/disputes/{id}", web::get().to(dispute_by_id::<SqliteDatabase, PaymentGateway>))
            .route("/disputes/{id}/evidence", web::post().to(submit_dispute_evidence::<SqliteDatabase, PaymentGateway>));
        let webhook_scope = web::scope("/webhooks")
            .route("/payments", web::post().to(payments_webhook::<SqliteDatabase, PaymentGateway>));
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mps::access_log"))
            .app_data(web::Data::new(payees_api))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(refunds_api))
            .app_data(web::Data::new(disputes_api))
            .app_data(web::Data::new(reconciler))
            .service(health)
            .service(api_scope)
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
