//! Payment intent orchestration.

use std::{collections::HashMap, fmt::Debug};

use log::*;
use mps_common::{MinorUnits, DEFAULT_CURRENCY_CODE_LOWER};
use processor_tools::data_objects::NewPaymentIntent;
use serde::Serialize;

use crate::{
    api::errors::PaymentEngineError,
    commission::CommissionSchedule,
    db_types::{NewPurchase, PayeeEarnings, PaymentIntentId, Purchase},
    traits::{ProcessorClient, SettlementDatabase, SettlementError},
};

/// What a buyer-facing client needs to take the charge through the processor's payment page.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseIntentResult {
    pub purchase: Purchase,
    pub payment_intent_id: PaymentIntentId,
    pub client_secret: Option<String>,
}

/// `SettlementFlowApi` drives the purchase lifecycle: opening ledger rows, creating the processor payment intent
/// with the split attached at charge time, and reporting earnings.
pub struct SettlementFlowApi<B, C> {
    db: B,
    client: C,
    schedule: CommissionSchedule,
}

impl<B, C> Debug for SettlementFlowApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementFlowApi")
    }
}

impl<B, C> SettlementFlowApi<B, C>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    pub fn new(db: B, client: C, schedule: CommissionSchedule) -> Self {
        Self { db, client, schedule }
    }

    pub fn schedule(&self) -> &CommissionSchedule {
        &self.schedule
    }

    /// Create a purchase: ledger row first, processor payment intent second.
    ///
    /// The ledger row is opened before any money-moving call so that eligibility failures cost nothing, and so that
    /// every processor intent we create is already accounted for locally. The intent carries the server-computed
    /// split: `application_fee_amount` is the platform's cut plus the processor fee, and `transfer_data.destination`
    /// receives exactly the payee amount. If the processor call fails or times out, the row is marked `failed` and
    /// the caller gets a retryable error; we never leave an ambiguous pending row behind.
    pub async fn create_purchase_intent(
        &self,
        buyer_id: &str,
        app_id: &str,
        payee_id: &str,
        gross: MinorUnits,
        buyer_email: &str,
    ) -> Result<PurchaseIntentResult, PaymentEngineError> {
        let split = self.schedule.split(gross)?;
        let payee = self
            .db
            .fetch_payee_by_owner(payee_id)
            .await?
            .ok_or_else(|| SettlementError::PayeeNotFound(payee_id.to_string()))?;
        let new_purchase = NewPurchase {
            buyer_id: buyer_id.to_string(),
            app_id: app_id.to_string(),
            payee_id: payee_id.to_string(),
            gross_amount: gross,
        };
        let purchase = self.db.open_purchase(new_purchase, split).await?;
        debug!("🔄️💳️ Purchase #{} opened. Creating the payment intent for {gross}.", purchase.id);

        let customer = match self.resolve_customer(buyer_email).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail_purchase(purchase.id, e).await),
        };
        let mut metadata = HashMap::new();
        metadata.insert("purchase_id".to_string(), purchase.id.to_string());
        metadata.insert("app_id".to_string(), app_id.to_string());
        let intent = NewPaymentIntent {
            amount: split.gross,
            currency: DEFAULT_CURRENCY_CODE_LOWER.to_string(),
            customer,
            application_fee_amount: split.processor_fee + split.platform_fee,
            transfer_destination: payee.processor_account_id.clone(),
            metadata,
        };
        let idempotency_key = format!("purchase-{}", purchase.id);
        let intent = match self.client.create_payment_intent(&intent, &idempotency_key).await {
            Ok(intent) => intent,
            Err(e) => return Err(self.fail_purchase(purchase.id, e.into()).await),
        };
        let intent_id = PaymentIntentId(intent.id);
        self.db.attach_payment_intent(purchase.id, &intent_id).await?;
        info!("🔄️💳️ Payment intent {intent_id} created for purchase #{}", purchase.id);
        let purchase = self
            .db
            .fetch_purchase(purchase.id)
            .await?
            .ok_or(SettlementError::PurchaseNotFound(purchase.id))?;
        Ok(PurchaseIntentResult { purchase, payment_intent_id: intent_id, client_secret: intent.client_secret })
    }

    /// Reuse the processor customer for this email if one exists, create one otherwise.
    async fn resolve_customer(&self, email: &str) -> Result<String, PaymentEngineError> {
        if let Some(customer) = self.client.find_customer_by_email(email).await? {
            trace!("🔄️💳️ Reusing processor customer {}", customer.id);
            return Ok(customer.id);
        }
        let customer = self.client.create_customer(email).await?;
        debug!("🔄️💳️ Created processor customer {}", customer.id);
        Ok(customer.id)
    }

    /// Close out a purchase whose intent never materialised, preserving the original error for the caller.
    async fn fail_purchase(&self, purchase_id: i64, cause: PaymentEngineError) -> PaymentEngineError {
        warn!("🔄️💳️ Purchase #{purchase_id} could not reach the processor: {cause}. Marking it failed.");
        if let Err(e) = self.db.mark_failed_local(purchase_id, &cause.to_string()).await {
            error!("🔄️💳️ Could not mark purchase #{purchase_id} as failed: {e}");
        }
        cause
    }

    /// The ledger's view of a payee's earnings. Authorisation (owner or admin only) is the caller's responsibility;
    /// this method only aggregates.
    pub async fn get_earnings(&self, payee_id: &str) -> Result<PayeeEarnings, PaymentEngineError> {
        Ok(self.db.fetch_earnings_for_payee(payee_id).await?)
    }

    pub async fn get_purchase(&self, purchase_id: i64) -> Result<Option<Purchase>, PaymentEngineError> {
        Ok(self.db.fetch_purchase(purchase_id).await?)
    }
}
