//! Dispute manager.
//!
//! The dispute state machine is driven entirely by processor events. The only locally initiated action is evidence
//! submission, which is a request to the processor, not a state transition.

use std::{fmt::Debug, str::FromStr};

use chrono::{DateTime, Utc};
use log::*;
use processor_tools::data_objects::{DisputeEvidence, ProcessorDispute};

use crate::{
    api::errors::PaymentEngineError,
    db_types::{DisputeCase, DisputeStatus, NewDispute, PaymentIntentId},
    traits::{ProcessorClient, SettlementDatabase, SettlementError},
};

pub struct DisputeApi<B, C> {
    db: B,
    client: C,
}

impl<B, C> Debug for DisputeApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisputeApi")
    }
}

impl<B, C> DisputeApi<B, C>
where
    B: SettlementDatabase,
    C: ProcessorClient,
{
    pub fn new(db: B, client: C) -> Self {
        Self { db, client }
    }

    /// Record a newly opened dispute and flag the purchase. Idempotent on the processor dispute id: a redelivered
    /// open event returns the existing case without touching the purchase again.
    pub async fn on_dispute_opened(
        &self,
        dispute: &ProcessorDispute,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<(DisputeCase, bool), PaymentEngineError> {
        let status = parse_dispute_status(&dispute.status);
        let new_dispute = NewDispute {
            payment_intent_id: PaymentIntentId(dispute.payment_intent.clone()),
            processor_dispute_id: dispute.id.clone(),
            amount: dispute.amount,
            reason: dispute.reason.clone(),
            status,
            evidence_due_by: dispute.evidence_due_by,
        };
        let (case, created) = self.db.upsert_dispute(new_dispute, event_at, event_id).await?;
        if created {
            warn!("🔄️⚖️ Dispute {} opened against purchase #{} for {}", case.processor_dispute_id, case.purchase_id, case.amount);
        }
        Ok((case, created))
    }

    /// Forward structured evidence to the processor and mirror whatever state it reports back. Refused once the
    /// evidence window has closed.
    pub async fn submit_evidence(
        &self,
        dispute_id: i64,
        evidence: &DisputeEvidence,
    ) -> Result<DisputeCase, PaymentEngineError> {
        let case = self
            .db
            .fetch_dispute(dispute_id)
            .await?
            .ok_or_else(|| SettlementError::DisputeNotFound(dispute_id.to_string()))?;
        if let Some(due) = case.evidence_due_by {
            if Utc::now() > due {
                return Err(PaymentEngineError::EvidenceWindowClosed { due });
            }
        }
        let response = self.client.update_dispute(&case.processor_dispute_id, evidence).await?;
        let status = parse_dispute_status(&response.status);
        let case = self
            .db
            .update_dispute_status(&case.processor_dispute_id, status, response.evidence_due_by, Utc::now(), None)
            .await?;
        info!("🔄️⚖️ Evidence submitted for dispute {}; processor reports {status}", case.processor_dispute_id);
        Ok(case)
    }

    /// Apply a terminal decision from the processor. The ledger side (restore or forfeit) happens in the same
    /// backend transaction as the status write.
    pub async fn on_dispute_closed(
        &self,
        dispute: &ProcessorDispute,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<DisputeCase, PaymentEngineError> {
        let status = parse_dispute_status(&dispute.status);
        if !status.is_terminal() {
            return Err(PaymentEngineError::ValidationError(format!(
                "dispute close event carried non-terminal status {status}"
            )));
        }
        let case =
            self.db.update_dispute_status(&dispute.id, status, dispute.evidence_due_by, event_at, event_id).await?;
        info!("🔄️⚖️ Dispute {} closed: {status}", case.processor_dispute_id);
        Ok(case)
    }

    pub async fn get_dispute(&self, dispute_id: i64) -> Result<Option<DisputeCase>, PaymentEngineError> {
        Ok(self.db.fetch_dispute(dispute_id).await?)
    }
}

/// The processor reports a handful of statuses we do not track separately; anything unrecognised is treated as
/// under review rather than rejected, since dispute events must never bounce for vocabulary reasons.
pub(crate) fn parse_dispute_status(s: &str) -> DisputeStatus {
    DisputeStatus::from_str(s).unwrap_or_else(|_| {
        debug!("🔄️⚖️ Unrecognised dispute status '{s}'. Treating it as under review.");
        DisputeStatus::UnderReview
    })
}
