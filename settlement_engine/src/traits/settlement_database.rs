use chrono::{DateTime, Duration, Utc};
use mps_common::MinorUnits;
use thiserror::Error;

use crate::{
    commission::CommissionSplit,
    db_types::{
        DisputeCase,
        DisputeStatus,
        NewDispute,
        NewPurchase,
        NewRefund,
        PayeeEarnings,
        PaymentIntentId,
        Purchase,
        PurchaseStatus,
        RefundRequest,
        RefundStatus,
    },
    traits::PayeeAccountManagement,
};

/// This trait defines the highest level of behaviour for backends supporting the settlement engine.
///
/// This behaviour includes:
/// * Maintaining the settlement ledger (purchases and their commission splits).
/// * Tracking refund and dispute lifecycles against ledger rows.
/// * Webhook event deduplication.
///
/// Every mutation that touches more than one row runs in a single backend transaction, which is also what serialises
/// concurrent webhook handlers for the same entity. The `event_at` parameters carry the processor's event timestamp
/// and feed the per-entity causal watermark: an event older than the last applied one is rejected with
/// [`SettlementError::StaleEvent`].
///
/// Webhook-driven mutations take an `event_id`. When present, the dedup marker for that event is written in the
/// same transaction as the effect, so the marker and the effect commit or roll back together: a marker on record
/// always means the effect landed, and an event whose effect could not be applied stays unconsumed so a redelivery
/// can apply it once the ledger has caught up. A marker that is already present short-circuits the call with
/// [`SettlementError::DuplicateEvent`] before anything is touched.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + PayeeAccountManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Open a new ledger row in `pending` status. This is the only way a purchase row is created.
    ///
    /// Validates that the payee resolves to an account with `charges_enabled`, failing with
    /// [`SettlementError::PayeeNotEligible`] (and creating nothing) otherwise. The commission split has already been
    /// computed by the caller; conservation is also enforced by a database CHECK constraint.
    async fn open_purchase(&self, purchase: NewPurchase, split: CommissionSplit) -> Result<Purchase, SettlementError>;

    /// Record the processor's payment intent id against a freshly opened purchase.
    async fn attach_payment_intent(
        &self,
        purchase_id: i64,
        intent_id: &PaymentIntentId,
    ) -> Result<(), SettlementError>;

    async fn fetch_purchase(&self, purchase_id: i64) -> Result<Option<Purchase>, SettlementError>;

    async fn fetch_purchase_by_intent(&self, intent_id: &PaymentIntentId) -> Result<Option<Purchase>, SettlementError>;

    /// Transition `pending → completed` on a verified charge-succeeded event. Idempotent: a purchase that is already
    /// completed is returned unchanged. A purchase in `failed` is a causally impossible predecessor and the call
    /// fails with [`SettlementError::InvalidTransition`].
    async fn mark_completed(
        &self,
        intent_id: &PaymentIntentId,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<Purchase, SettlementError>;

    /// Transition `pending → failed`. Idempotent.
    async fn mark_failed(
        &self,
        intent_id: &PaymentIntentId,
        reason: &str,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<Purchase, SettlementError>;

    /// Mark a purchase as failed before any processor object exists for it, e.g. when the create-intent call times
    /// out. Keyed by local id because there is no intent id yet.
    async fn mark_failed_local(&self, purchase_id: i64, reason: &str) -> Result<Purchase, SettlementError>;

    /// Persist a refund in `pending` status, keyed by the processor's refund id.
    async fn insert_refund(&self, refund: NewRefund) -> Result<RefundRequest, SettlementError>;

    async fn fetch_refund(&self, refund_id: i64) -> Result<Option<RefundRequest>, SettlementError>;

    async fn fetch_refund_by_processor_id(
        &self,
        processor_refund_id: &str,
    ) -> Result<Option<RefundRequest>, SettlementError>;

    /// Sum of refund amounts for a purchase in the given statuses.
    async fn refunded_total(
        &self,
        purchase_id: i64,
        statuses: &[RefundStatus],
    ) -> Result<MinorUnits, SettlementError>;

    /// Apply a refund status transition reported by the processor. On `succeeded`, the owning purchase is moved to
    /// `refunded` or `partially_refunded` in the same transaction, enforcing the cumulative-refund bound. Re-applying
    /// the current status is a no-op; leaving a terminal status fails with [`SettlementError::InvalidTransition`].
    async fn apply_refund_status(
        &self,
        processor_refund_id: &str,
        status: RefundStatus,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<RefundRequest, SettlementError>;

    /// Create the dispute case on first sight of a dispute event, marking the purchase `disputed` in the same
    /// transaction. Idempotent on the processor dispute id: duplicate delivery returns the existing row with
    /// `created = false`.
    async fn upsert_dispute(
        &self,
        dispute: NewDispute,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<(DisputeCase, bool), SettlementError>;

    async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<DisputeCase>, SettlementError>;

    async fn fetch_dispute_by_processor_id(
        &self,
        processor_dispute_id: &str,
    ) -> Result<Option<DisputeCase>, SettlementError>;

    /// Apply a dispute status change from the processor. Terminal statuses (`won`/`lost`) clear or forfeit the
    /// purchase in the same transaction, unless the purchase has already moved on (e.g. a refund settled while the
    /// dispute was open), in which case the decision is still recorded and the purchase is left alone. Once
    /// terminal, any further change fails with [`SettlementError::InvalidTransition`].
    async fn update_dispute_status(
        &self,
        processor_dispute_id: &str,
        status: DisputeStatus,
        evidence_due_by: Option<DateTime<Utc>>,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<DisputeCase, SettlementError>;

    /// Drop seen-event records older than the given age. The age must comfortably exceed the processor's maximum
    /// redelivery window.
    async fn purge_seen_events(&self, older_than: Duration) -> Result<u64, SettlementError>;

    /// Aggregate the ledger's gross commitments for one payee.
    async fn fetch_earnings_for_payee(&self, payee_id: &str) -> Result<PayeeEarnings, SettlementError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested purchase (id {0}) does not exist")]
    PurchaseNotFound(i64),
    #[error("No purchase is recorded for payment intent {0}")]
    PurchaseNotFoundForIntent(PaymentIntentId),
    #[error("No payee account exists for owner {0}")]
    PayeeNotFound(String),
    #[error("Payee {0} is not eligible to receive charges")]
    PayeeNotEligible(String),
    #[error("Invalid status transition from {from} to {to}: {message}")]
    InvalidTransition { from: String, to: String, message: String },
    #[error("Stale event: an event from {applied} has already been applied, rejecting the one from {stale}")]
    StaleEvent { applied: DateTime<Utc>, stale: DateTime<Utc> },
    #[error("Event {0} has already been applied")]
    DuplicateEvent(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Purchase in status {0} cannot be refunded")]
    PurchaseNotRefundable(PurchaseStatus),
    #[error("The requested refund (id {0}) does not exist")]
    RefundNotFound(String),
    #[error("The requested dispute (id {0}) does not exist")]
    DisputeNotFound(String),
}

impl SettlementError {
    pub fn invalid_transition<F: ToString, T: ToString, M: ToString>(from: F, to: T, message: M) -> Self {
        SettlementError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}
