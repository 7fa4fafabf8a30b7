//! Refund manager.

use std::fmt::Debug;

use log::*;
use mps_common::MinorUnits;

use crate::{
    api::errors::PaymentEngineError,
    db_types::{NewRefund, PurchaseStatus, RefundReason, RefundRequest, RefundStatus},
    traits::{ProcessorClient, SettlementDatabase, SettlementError},
};

/// `RefundApi` lets administrators request and cancel refunds. It never applies a refund to the ledger itself; that
/// only happens when the reconciler sees the processor confirm success.
pub struct RefundApi<B, C> {
    db: B,
    client: C,
}

impl<B, C> Debug for RefundApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, C> RefundApi<B, C>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    pub fn new(db: B, client: C) -> Self {
        Self { db, client }
    }

    /// Request a refund against a purchase.
    ///
    /// `amount` defaults to the full remaining refundable balance (gross minus refunds already succeeded). Pending
    /// refunds also count against the bound here, so two admins cannot queue overlapping refunds; the ledger itself
    /// only enforces the bound over succeeded ones. The local row is `pending` and keyed by the processor's refund
    /// id; the reconciler moves it from there.
    pub async fn request_refund(
        &self,
        purchase_id: i64,
        amount: Option<MinorUnits>,
        reason: RefundReason,
        admin_id: &str,
    ) -> Result<RefundRequest, PaymentEngineError> {
        let purchase = self
            .db
            .fetch_purchase(purchase_id)
            .await?
            .ok_or(SettlementError::PurchaseNotFound(purchase_id))?;
        if !matches!(
            purchase.status,
            PurchaseStatus::Completed | PurchaseStatus::PartiallyRefunded | PurchaseStatus::Disputed
        ) {
            return Err(SettlementError::PurchaseNotRefundable(purchase.status).into());
        }
        let intent_id = purchase
            .payment_intent_id
            .clone()
            .ok_or_else(|| PaymentEngineError::ValidationError(format!(
                "purchase #{purchase_id} has no payment intent to refund against"
            )))?;
        let committed =
            self.db.refunded_total(purchase_id, &[RefundStatus::Pending, RefundStatus::Succeeded]).await?;
        let remaining = purchase.gross_amount - committed;
        let amount = amount.unwrap_or(remaining);
        if !amount.is_positive() || amount > remaining {
            return Err(SettlementError::InvalidAmount(format!(
                "refund of {amount} exceeds the remaining refundable balance of {remaining}"
            ))
            .into());
        }
        // Two distinct refunds of the same amount by the same admin are legitimate, so the key carries fresh
        // request material rather than being derived from the refund's attributes.
        let idempotency_key = format!("refund-{purchase_id}-{}", processor_tools::api::idempotency_key());
        let refund = self.client.create_refund(intent_id.as_str(), amount, reason, &idempotency_key).await?;
        let new_refund = NewRefund {
            purchase_id,
            payment_intent_id: intent_id,
            processor_refund_id: refund.id,
            amount,
            reason,
            admin_id: admin_id.to_string(),
        };
        let refund = self.db.insert_refund(new_refund).await?;
        info!("🔄️↩️ Refund {} of {amount} requested by {admin_id} against purchase #{purchase_id}", refund.processor_refund_id);
        Ok(refund)
    }

    /// Cancel a pending refund. Legal only while the processor-side refund is still pending, which the processor
    /// enforces; the local row only moves to `canceled` after the processor confirms.
    pub async fn cancel_refund(&self, refund_id: i64, admin_id: &str) -> Result<RefundRequest, PaymentEngineError> {
        let refund = self
            .db
            .fetch_refund(refund_id)
            .await?
            .ok_or_else(|| SettlementError::RefundNotFound(refund_id.to_string()))?;
        if refund.status != RefundStatus::Pending {
            return Err(PaymentEngineError::RefundNotCancellable(refund.status));
        }
        let cancelled = self.client.cancel_refund(&refund.processor_refund_id).await?;
        debug!("🔄️↩️ Processor confirmed cancellation of refund {} ({})", cancelled.id, cancelled.status);
        let refund = self
            .db
            .apply_refund_status(&refund.processor_refund_id, RefundStatus::Canceled, chrono::Utc::now(), None)
            .await?;
        info!("🔄️↩️ Refund {} cancelled by {admin_id}", refund.processor_refund_id);
        Ok(refund)
    }

    pub async fn get_refund(&self, refund_id: i64) -> Result<Option<RefundRequest>, PaymentEngineError> {
        Ok(self.db.fetch_refund(refund_id).await?)
    }
}
