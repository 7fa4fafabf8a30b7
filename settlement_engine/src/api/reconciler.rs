//! Webhook reconciler.
//!
//! The single entry point for processor webhook deliveries. Verification fails closed: nothing is parsed, let alone
//! applied, until the signature checks out. Delivery is at-least-once and unordered, so every handler is idempotent
//! and stale or causally impossible events are acknowledged (logged, not applied) rather than bounced; a non-2xx
//! response is reserved for signature failures, malformed payloads, and genuine internal errors, where redelivery
//! can actually help.
//!
//! Deduplication rides inside the effect: each handler passes the event id down to the backend, which claims it in
//! the same transaction that applies the change. An event is only ever consumed together with its effect, so an
//! event that could not be applied yet (say a dispute arriving ahead of the charge confirmation) stays unclaimed
//! and a later redelivery lands it once the ledger has caught up.

use std::{fmt::Debug, str::FromStr};

use chrono::Utc;
use log::*;
use mps_common::Secret;
use processor_tools::{
    data_objects::{PaymentIntent, ProcessorAccount, ProcessorDispute, ProcessorEvent, ProcessorRefund},
    webhook::verify_signature,
};

use crate::{
    api::{dispute_api::parse_dispute_status, errors::WebhookError, DisputeApi},
    db_types::{PayeeStateUpdate, PaymentIntentId, RefundStatus},
    events::{DisputeClosedEvent, EventProducers, PurchaseSettledEvent, RefundSettledEvent},
    traits::{ProcessorClient, SettlementDatabase, SettlementError},
};

pub struct WebhookReconciler<B, C> {
    db: B,
    client: C,
    disputes: DisputeApi<B, C>,
    secret: Secret<String>,
    producers: EventProducers,
}

impl<B, C> Debug for WebhookReconciler<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookReconciler")
    }
}

impl<B, C> WebhookReconciler<B, C>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    pub fn new(db: B, client: C, secret: Secret<String>, producers: EventProducers) -> Self {
        let disputes = DisputeApi::new(db.clone(), client.clone());
        Self { db, client, disputes, secret, producers }
    }

    /// Verify and apply one webhook delivery. `Ok(())` means the delivery may be acknowledged with a 2xx,
    /// including the cases where it was a duplicate, stale, or an event type we do not handle.
    pub async fn handle(&self, payload: &str, signature_header: &str) -> Result<(), WebhookError> {
        verify_signature(self.secret.reveal(), signature_header, payload, Utc::now())?;
        let event: ProcessorEvent =
            serde_json::from_str(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        trace!("🛍️ Processing event {} ({})", event.id, event.event_type);
        match event.event_type.as_str() {
            "payment_intent.succeeded" => self.on_intent_succeeded(&event).await,
            "payment_intent.payment_failed" => self.on_intent_failed(&event).await,
            "refund.updated" => self.on_refund_updated(&event).await,
            "charge.dispute.created" => self.on_dispute_created(&event).await,
            "charge.dispute.updated" => self.on_dispute_updated(&event).await,
            "charge.dispute.closed" => self.on_dispute_closed(&event).await,
            "account.updated" => self.on_account_updated(&event).await,
            other => {
                debug!("🛍️ Ignoring event {} of unhandled type {other}", event.id);
                Ok(())
            },
        }
    }

    async fn on_intent_succeeded(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let intent: PaymentIntent = parse_object(event)?;
        let intent_id = PaymentIntentId(intent.id);
        let result = self.db.mark_completed(&intent_id, event.created, Some(&event.id)).await;
        if let Some(purchase) = acknowledge_benign(result, &event.id)? {
            info!("🛍️ Purchase #{} settled for {}", purchase.id, purchase.gross_amount);
            for producer in &self.producers.purchase_settled_producer {
                producer.publish_event(PurchaseSettledEvent::new(purchase.clone())).await;
            }
        }
        Ok(())
    }

    async fn on_intent_failed(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let intent: PaymentIntent = parse_object(event)?;
        let intent_id = PaymentIntentId(intent.id);
        let reason = format!("processor reported status {}", intent.status);
        let result = self.db.mark_failed(&intent_id, &reason, event.created, Some(&event.id)).await;
        acknowledge_benign(result, &event.id)?;
        Ok(())
    }

    async fn on_refund_updated(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let refund: ProcessorRefund = parse_object(event)?;
        let Ok(status) = RefundStatus::from_str(&refund.status) else {
            debug!("🛍️ Refund {} reports unrecognised status '{}'. Acknowledging.", refund.id, refund.status);
            return Ok(());
        };
        let result = self.db.apply_refund_status(&refund.id, status, event.created, Some(&event.id)).await;
        if let Some(refund) = acknowledge_benign(result, &event.id)? {
            if status == RefundStatus::Succeeded {
                info!("🛍️ Refund {} of {} succeeded", refund.processor_refund_id, refund.amount);
                let purchase = self
                    .db
                    .fetch_purchase(refund.purchase_id)
                    .await?
                    .ok_or(SettlementError::PurchaseNotFound(refund.purchase_id))?;
                for producer in &self.producers.refund_settled_producer {
                    producer.publish_event(RefundSettledEvent::new(refund.clone(), purchase.clone())).await;
                }
            }
        }
        Ok(())
    }

    async fn on_dispute_created(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let dispute: ProcessorDispute = parse_object(event)?;
        let result = self.disputes.on_dispute_opened(&dispute, event.created, Some(&event.id)).await;
        acknowledge_benign_api(result, &event.id)?;
        Ok(())
    }

    async fn on_dispute_updated(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let dispute: ProcessorDispute = parse_object(event)?;
        let status = parse_dispute_status(&dispute.status);
        // Some processors report the decision through an update event rather than a dedicated close.
        if status.is_terminal() {
            return self.on_dispute_closed(event).await;
        }
        let result = self
            .db
            .update_dispute_status(&dispute.id, status, dispute.evidence_due_by, event.created, Some(&event.id))
            .await;
        acknowledge_benign(result, &event.id)?;
        Ok(())
    }

    async fn on_dispute_closed(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let dispute: ProcessorDispute = parse_object(event)?;
        let result = self.disputes.on_dispute_closed(&dispute, event.created, Some(&event.id)).await;
        if let Some(case) = acknowledge_benign_api(result, &event.id)? {
            for producer in &self.producers.dispute_closed_producer {
                producer.publish_event(DisputeClosedEvent::new(case.clone())).await;
            }
        }
        Ok(())
    }

    /// Capability changes are never taken from the webhook payload. The event only tells us which account to look
    /// at; the state written locally is pulled fresh from the processor.
    async fn on_account_updated(&self, event: &ProcessorEvent) -> Result<(), WebhookError> {
        let account: ProcessorAccount = parse_object(event)?;
        let fresh = self.client.get_account(&account.id).await?;
        let update = PayeeStateUpdate::from(&fresh);
        let result = self.db.update_payee_state(&fresh.id, update).await;
        if let Some(payee) = acknowledge_benign(result, &event.id)? {
            info!("🛍️ Payee {} is now {} (charges: {})", payee.processor_account_id, payee.verification_status, payee.charges_enabled);
        }
        Ok(())
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &ProcessorEvent) -> Result<T, WebhookError> {
    event.object().map_err(|e| WebhookError::MalformedPayload(format!("event {}: {e}", event.id)))
}

/// Separate the errors worth a redelivery from the ones that are not.
///
/// Stale events, causally impossible transitions, and references to entities we never created are all conditions a
/// redelivery cannot fix, so they are logged and acknowledged. Database errors propagate so the processor retries.
fn acknowledge_benign<T>(result: Result<T, SettlementError>, event_id: &str) -> Result<Option<T>, WebhookError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e @ SettlementError::DatabaseError(_)) => Err(e.into()),
        Err(SettlementError::DuplicateEvent(_)) => {
            debug!("🛍️ Event {event_id} has been applied before. Acknowledging without effect.");
            Ok(None)
        },
        Err(e) => {
            warn!("🛍️ Event {event_id} was not applied ({e}). Acknowledging it anyway.");
            Ok(None)
        },
    }
}

fn acknowledge_benign_api<T>(
    result: Result<T, crate::api::errors::PaymentEngineError>,
    event_id: &str,
) -> Result<Option<T>, WebhookError> {
    use crate::api::errors::PaymentEngineError::*;
    match result {
        Ok(v) => Ok(Some(v)),
        Err(Settlement(e @ SettlementError::DatabaseError(_))) => Err(e.into()),
        Err(Settlement(SettlementError::DuplicateEvent(_))) => {
            debug!("🛍️ Event {event_id} has been applied before. Acknowledging without effect.");
            Ok(None)
        },
        Err(ExternalServiceError { message, .. }) => Err(WebhookError::Processor(message)),
        Err(e) => {
            warn!("🛍️ Event {event_id} was not applied ({e}). Acknowledging it anyway.");
            Ok(None)
        },
    }
}
