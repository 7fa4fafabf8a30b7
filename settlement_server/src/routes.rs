//! Request handlers for the settlement server.
//!
//! Handlers are generic over the database backend (`B`) and processor client (`C`) and are registered with the
//! concrete types turbofished in at server-construction time. That keeps the endpoint logic testable against the
//! engine's mock processor without any service rewiring.
//!
//! Authorisation lives here. The engine APIs deliberately do not know who is calling; every handler first settles
//! the "may this identity do this" question via [`AuthenticatedUser`] and only then delegates.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use log::*;
use processor_tools::{data_objects::DisputeEvidence, webhook::SIGNATURE_HEADER};
use settlement_engine::{
    DisputeApi,
    PayeeApi,
    ProcessorClient,
    RefundApi,
    SettlementDatabase,
    SettlementFlowApi,
    WebhookReconciler,
};

use crate::{
    auth::AuthenticatedUser,
    data_objects::{CreatePurchaseRequest, JsonResponse, OnboardingRequest, OnboardingResponse, RefundRequestBody},
    errors::ServerError,
};

/// Route handler for the health check endpoint
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("🚀️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payees   ----------------------------------------------------

/// POST /api/payees/onboarding
///
/// Starts (or resumes) payout onboarding for the authenticated user. Safe to call repeatedly; an existing account
/// gets a fresh hosted-flow link rather than a second processor account.
pub async fn begin_onboarding<B, C>(
    user: AuthenticatedUser,
    body: web::Json<OnboardingRequest>,
    api: web::Data<PayeeApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let req = body.into_inner();
    debug!("🔐️ POST onboarding for {}", user.id);
    let (payee, link) = api.begin_onboarding(&user.id, &req.email, &req.country, req.account_type).await?;
    let response = OnboardingResponse {
        owner_id: payee.owner_id,
        processor_account_id: payee.processor_account_id,
        onboarding_url: link.url,
    };
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/payees/me
pub async fn my_payee_account<B, C>(
    user: AuthenticatedUser,
    api: web::Data<PayeeApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let payee = api
        .get_account(&user.id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("no payee account for {}", user.id)))?;
    Ok(HttpResponse::Ok().json(payee))
}

/// POST /api/payees/me/refresh
///
/// Pulls the account's current capability state from the processor and returns the updated local mirror.
pub async fn refresh_payee_account<B, C>(
    user: AuthenticatedUser,
    api: web::Data<PayeeApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let payee = api.refresh_account_status(&user.id).await?;
    Ok(HttpResponse::Ok().json(payee))
}

/// POST /api/payees/me/reauth_link
pub async fn create_reauth_link<B, C>(
    user: AuthenticatedUser,
    api: web::Data<PayeeApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let link = api.create_reauth_link(&user.id).await?;
    Ok(HttpResponse::Ok().json(link))
}

/// GET /api/payees/{owner_id}/earnings
///
/// Payees may see their own earnings; admins may see anyone's.
pub async fn earnings<B, C>(
    user: AuthenticatedUser,
    path: web::Path<String>,
    api: web::Data<SettlementFlowApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let owner_id = path.into_inner();
    user.require_self_or_admin(&owner_id)?;
    let summary = api.get_earnings(&owner_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

//---------------------------------------------   Purchases   --------------------------------------------------

/// POST /api/purchases
///
/// Opens a purchase and returns the client secret the buyer's client needs to complete payment.
pub async fn create_purchase<B, C>(
    user: AuthenticatedUser,
    body: web::Json<CreatePurchaseRequest>,
    api: web::Data<SettlementFlowApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let req = body.into_inner();
    debug!("🔐️ POST purchase of {} for app {} by {}", req.amount, req.app_id, user.id);
    let result =
        api.create_purchase_intent(&user.id, &req.app_id, &req.payee_id, req.amount, &req.buyer_email).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/purchases/{id}
///
/// Visible to the buyer, the payee, and admins.
pub async fn purchase_by_id<B, C>(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    api: web::Data<SettlementFlowApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let purchase_id = path.into_inner();
    let purchase = api
        .get_purchase(purchase_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("no purchase #{purchase_id}")))?;
    if user.id != purchase.buyer_id {
        user.require_self_or_admin(&purchase.payee_id)?;
    }
    Ok(HttpResponse::Ok().json(purchase))
}

//----------------------------------------------   Refunds   ---------------------------------------------------

/// POST /api/refunds. Admin only.
pub async fn request_refund<B, C>(
    user: AuthenticatedUser,
    body: web::Json<RefundRequestBody>,
    api: web::Data<RefundApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    user.require_admin()?;
    let req = body.into_inner();
    let refund = api.request_refund(req.purchase_id, req.amount, req.reason, &user.id).await?;
    Ok(HttpResponse::Ok().json(refund))
}

/// POST /api/refunds/{id}/cancel. Admin only.
pub async fn cancel_refund<B, C>(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    api: web::Data<RefundApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    user.require_admin()?;
    let refund = api.cancel_refund(path.into_inner(), &user.id).await?;
    Ok(HttpResponse::Ok().json(refund))
}

/// GET /api/refunds/{id}. Admin only.
pub async fn refund_by_id<B, C>(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    api: web::Data<RefundApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    user.require_admin()?;
    let refund_id = path.into_inner();
    let refund = api
        .get_refund(refund_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("no refund #{refund_id}")))?;
    Ok(HttpResponse::Ok().json(refund))
}

//----------------------------------------------   Disputes   --------------------------------------------------

/// GET /api/disputes/{id}. Admin only.
pub async fn dispute_by_id<B, C>(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    api: web::Data<DisputeApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    user.require_admin()?;
    let dispute_id = path.into_inner();
    let case = api
        .get_dispute(dispute_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("no dispute #{dispute_id}")))?;
    Ok(HttpResponse::Ok().json(case))
}

/// POST /api/disputes/{id}/evidence. Admin only.
pub async fn submit_dispute_evidence<B, C>(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: web::Json<DisputeEvidence>,
    api: web::Data<DisputeApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    user.require_admin()?;
    let case = api.submit_evidence(path.into_inner(), &body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(case))
}

//----------------------------------------------   Webhooks   --------------------------------------------------

/// POST /webhooks/payments
///
/// The processor's webhook delivery endpoint. The body must be the raw bytes as signed; running it through a JSON
/// extractor first would invalidate the signature, so the payload arrives as `Bytes` and is parsed downstream,
/// after verification.
pub async fn payments_webhook<B, C>(
    req: HttpRequest,
    body: Bytes,
    reconciler: web::Data<WebhookReconciler<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("missing {SIGNATURE_HEADER} header")))?
        .to_string();
    let payload = std::str::from_utf8(&body)
        .map_err(|e| ServerError::InvalidRequestBody(format!("webhook body is not valid utf-8: {e}")))?;
    trace!("🛍️ Webhook delivery of {} bytes received", body.len());
    reconciler.handle(payload, &signature).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("ok")))
}
