use chrono::{DateTime, Duration, Utc};
use log::debug;
use mps_common::MinorUnits;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::{
    commission::CommissionSplit,
    db::sqlite::{db_url, disputes, new_pool, payees, purchases, refunds, run_migrations, webhook_events},
    db_types::{
        DisputeCase,
        DisputeStatus,
        NewDispute,
        NewPayeeAccount,
        NewPurchase,
        NewRefund,
        PayeeAccount,
        PayeeEarnings,
        PayeeStateUpdate,
        PaymentIntentId,
        Purchase,
        PurchaseStatus,
        RefundRequest,
        RefundStatus,
    },
    traits::{PayeeAccountManagement, SettlementDatabase, SettlementError},
};

/// Claim a webhook event inside the transaction that applies its effect, so the dedup marker and the effect commit
/// or roll back together. An effect that fails leaves the event unclaimed for redelivery to pick up.
async fn claim_event(
    event_id: Option<&str>,
    conn: &mut sqlx::SqliteConnection,
) -> Result<(), SettlementError> {
    if let Some(id) = event_id {
        if !webhook_events::record_event(id, conn).await? {
            return Err(SettlementError::DuplicateEvent(id.to_string()));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase").field("url", &self.url).finish()
    }
}

impl SqliteDatabase {
    /// Connect to the database at `MPS_DATABASE_URL` (or the default path) and bring the schema up to date.
    pub async fn new(max_connections: u32) -> Result<Self, SettlementError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementError> {
        let pool = new_pool(url, max_connections).await?;
        run_migrations(&pool).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PayeeAccountManagement for SqliteDatabase {
    async fn upsert_payee_account(&self, payee: NewPayeeAccount) -> Result<PayeeAccount, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        payees::upsert(payee, &mut conn).await
    }

    async fn fetch_payee_by_owner(&self, owner_id: &str) -> Result<Option<PayeeAccount>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        payees::fetch_by_owner(owner_id, &mut conn).await
    }

    async fn fetch_payee_by_processor_id(
        &self,
        processor_account_id: &str,
    ) -> Result<Option<PayeeAccount>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        payees::fetch_by_processor_id(processor_account_id, &mut conn).await
    }

    async fn update_payee_state(
        &self,
        processor_account_id: &str,
        update: PayeeStateUpdate,
    ) -> Result<PayeeAccount, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        payees::update_state(processor_account_id, update, &mut conn).await
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn open_purchase(&self, purchase: NewPurchase, split: CommissionSplit) -> Result<Purchase, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payee = payees::fetch_by_owner(&purchase.payee_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::PayeeNotFound(purchase.payee_id.clone()))?;
        if !payee.charges_enabled {
            return Err(SettlementError::PayeeNotEligible(purchase.payee_id.clone()));
        }
        let purchase = purchases::insert_purchase(purchase, split, &mut tx).await?;
        tx.commit().await?;
        Ok(purchase)
    }

    async fn attach_payment_intent(
        &self,
        purchase_id: i64,
        intent_id: &PaymentIntentId,
    ) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        purchases::attach_payment_intent(purchase_id, intent_id, &mut conn).await
    }

    async fn fetch_purchase(&self, purchase_id: i64) -> Result<Option<Purchase>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        purchases::fetch_purchase(purchase_id, &mut conn).await
    }

    async fn fetch_purchase_by_intent(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<Option<Purchase>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        purchases::fetch_purchase_by_intent(intent_id, &mut conn).await
    }

    async fn mark_completed(
        &self,
        intent_id: &PaymentIntentId,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<Purchase, SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_event(event_id, &mut tx).await?;
        let purchase = purchases::mark_completed(intent_id, event_at, &mut tx).await?;
        tx.commit().await?;
        Ok(purchase)
    }

    async fn mark_failed(
        &self,
        intent_id: &PaymentIntentId,
        reason: &str,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<Purchase, SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_event(event_id, &mut tx).await?;
        let purchase = purchases::mark_failed(intent_id, reason, event_at, &mut tx).await?;
        tx.commit().await?;
        Ok(purchase)
    }

    async fn mark_failed_local(&self, purchase_id: i64, reason: &str) -> Result<Purchase, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let purchase = purchases::mark_failed_local(purchase_id, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(purchase)
    }

    async fn insert_refund(&self, refund: NewRefund) -> Result<RefundRequest, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        refunds::insert_refund(refund, &mut conn).await
    }

    async fn fetch_refund(&self, refund_id: i64) -> Result<Option<RefundRequest>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refund(refund_id, &mut conn).await
    }

    async fn fetch_refund_by_processor_id(
        &self,
        processor_refund_id: &str,
    ) -> Result<Option<RefundRequest>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refund_by_processor_id(processor_refund_id, &mut conn).await
    }

    async fn refunded_total(
        &self,
        purchase_id: i64,
        statuses: &[RefundStatus],
    ) -> Result<MinorUnits, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        refunds::refunded_total(purchase_id, statuses, &mut conn).await
    }

    async fn apply_refund_status(
        &self,
        processor_refund_id: &str,
        status: RefundStatus,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<RefundRequest, SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_event(event_id, &mut tx).await?;
        let refund = refunds::update_status(processor_refund_id, status, event_at, &mut tx).await?;
        if status == RefundStatus::Succeeded {
            let total = refunds::refunded_total(refund.purchase_id, &[RefundStatus::Succeeded], &mut tx).await?;
            let purchase = purchases::fetch_purchase(refund.purchase_id, &mut tx)
                .await?
                .ok_or(SettlementError::PurchaseNotFound(refund.purchase_id))?;
            purchases::apply_refund(&purchase, total, event_at, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(refund)
    }

    async fn upsert_dispute(
        &self,
        dispute: NewDispute,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<(DisputeCase, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_event(event_id, &mut tx).await?;
        let purchase = purchases::fetch_purchase_by_intent(&dispute.payment_intent_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::PurchaseNotFoundForIntent(dispute.payment_intent_id.clone()))?;
        let (case, created) = disputes::upsert_dispute(purchase.id, &dispute, event_at, &mut tx).await?;
        if created {
            purchases::mark_disputed(purchase.id, event_at, &mut tx).await?;
        }
        tx.commit().await?;
        Ok((case, created))
    }

    async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<DisputeCase>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        disputes::fetch_dispute(dispute_id, &mut conn).await
    }

    async fn fetch_dispute_by_processor_id(
        &self,
        processor_dispute_id: &str,
    ) -> Result<Option<DisputeCase>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        disputes::fetch_dispute_by_processor_id(processor_dispute_id, &mut conn).await
    }

    async fn update_dispute_status(
        &self,
        processor_dispute_id: &str,
        status: DisputeStatus,
        evidence_due_by: Option<DateTime<Utc>>,
        event_at: DateTime<Utc>,
        event_id: Option<&str>,
    ) -> Result<DisputeCase, SettlementError> {
        let mut tx = self.pool.begin().await?;
        claim_event(event_id, &mut tx).await?;
        let before = disputes::fetch_dispute_by_processor_id(processor_dispute_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::DisputeNotFound(processor_dispute_id.to_string()))?;
        let case = disputes::update_status(processor_dispute_id, status, evidence_due_by, event_at, &mut tx).await?;
        // A transition into a decided state settles the purchase side too. The purchase may have left `disputed`
        // in the meantime (a refund can settle while a dispute is open); the decision is recorded regardless and
        // the ledger row is left where the later event put it.
        if case.status.is_terminal() && !before.status.is_terminal() {
            let purchase = purchases::fetch_purchase(case.purchase_id, &mut tx)
                .await?
                .ok_or(SettlementError::PurchaseNotFound(case.purchase_id))?;
            if purchase.status == PurchaseStatus::Disputed {
                purchases::clear_dispute(case.purchase_id, case.status == DisputeStatus::Won, event_at, &mut tx)
                    .await?;
            } else {
                debug!(
                    "🗃️ Dispute {processor_dispute_id} decided ({status}) but purchase #{} is already {}; leaving it",
                    purchase.id, purchase.status
                );
            }
        }
        tx.commit().await?;
        Ok(case)
    }

    async fn purge_seen_events(&self, older_than: Duration) -> Result<u64, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::purge_older_than(older_than, &mut conn).await
    }

    async fn fetch_earnings_for_payee(&self, payee_id: &str) -> Result<PayeeEarnings, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let row: SqliteRow = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status IN ('completed', 'partially_refunded') THEN gross_amount ELSE 0 END), 0)
                    AS settled_gross,
                COALESCE(SUM(CASE WHEN status IN ('completed', 'partially_refunded') THEN payee_amount ELSE 0 END), 0)
                    AS settled_payee_amount,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN payee_amount ELSE 0 END), 0) AS pending_payee_amount,
                COALESCE(SUM(CASE WHEN status = 'disputed' THEN gross_amount ELSE 0 END), 0) AS disputed_gross,
                COUNT(CASE WHEN status != 'failed' THEN 1 END) AS purchase_count
            FROM purchases
            WHERE payee_id = $1
            "#,
        )
        .bind(payee_id)
        .fetch_one(&mut *conn)
        .await?;
        let refunded: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(r.amount), 0)
            FROM refunds r JOIN purchases p ON p.id = r.purchase_id
            WHERE p.payee_id = $1 AND r.status = 'succeeded'
            "#,
        )
        .bind(payee_id)
        .fetch_one(&mut *conn)
        .await?;
        let earnings = PayeeEarnings {
            payee_id: payee_id.to_string(),
            settled_gross: MinorUnits::from(row.try_get::<i64, _>("settled_gross")?),
            settled_payee_amount: MinorUnits::from(row.try_get::<i64, _>("settled_payee_amount")?),
            pending_payee_amount: MinorUnits::from(row.try_get::<i64, _>("pending_payee_amount")?),
            refunded_amount: MinorUnits::from(refunded),
            disputed_gross: MinorUnits::from(row.try_get::<i64, _>("disputed_gross")?),
            purchase_count: row.try_get("purchase_count")?,
        };
        debug!("🗃️ Earnings summary for {payee_id}: {} settled over {} purchases", earnings.settled_gross, earnings.purchase_count);
        Ok(earnings)
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}
