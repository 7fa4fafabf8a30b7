use chrono::{DateTime, Utc};
use log::debug;
use mps_common::MinorUnits;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewRefund, RefundRequest, RefundStatus},
    traits::SettlementError,
};

const REFUND_COLUMNS: &str = r#"
    id,
    purchase_id,
    payment_intent_id,
    processor_refund_id,
    amount,
    reason,
    status,
    admin_id,
    last_event_at,
    created_at,
    updated_at
"#;

/// Insert a refund in `pending` status. Idempotent on the processor refund id, so replaying a create-refund response
/// is harmless.
pub async fn insert_refund(refund: NewRefund, conn: &mut SqliteConnection) -> Result<RefundRequest, SettlementError> {
    let res = sqlx::query(
        r#"
        INSERT INTO refunds (purchase_id, payment_intent_id, processor_refund_id, amount, reason, admin_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (processor_refund_id) DO NOTHING
        "#,
    )
    .bind(refund.purchase_id)
    .bind(&refund.payment_intent_id)
    .bind(&refund.processor_refund_id)
    .bind(refund.amount)
    .bind(refund.reason)
    .bind(&refund.admin_id)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() > 0 {
        debug!("🗃️ Refund {} ({}) recorded against purchase #{}", refund.processor_refund_id, refund.amount, refund.purchase_id);
    }
    fetch_refund_by_processor_id(&refund.processor_refund_id, conn)
        .await?
        .ok_or_else(|| SettlementError::RefundNotFound(refund.processor_refund_id.clone()))
}

pub async fn fetch_refund(id: i64, conn: &mut SqliteConnection) -> Result<Option<RefundRequest>, SettlementError> {
    let q = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE id = $1");
    let refund = sqlx::query_as::<_, RefundRequest>(&q).bind(id).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_refund_by_processor_id(
    processor_refund_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, SettlementError> {
    let q = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE processor_refund_id = $1");
    let refund = sqlx::query_as::<_, RefundRequest>(&q).bind(processor_refund_id).fetch_optional(conn).await?;
    Ok(refund)
}

/// Sum of refund amounts for a purchase over the given statuses. An empty status list sums nothing.
pub async fn refunded_total(
    purchase_id: i64,
    statuses: &[RefundStatus],
    conn: &mut SqliteConnection,
) -> Result<MinorUnits, SettlementError> {
    if statuses.is_empty() {
        return Ok(MinorUnits::from(0));
    }
    let mut builder = sqlx::QueryBuilder::new("SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE purchase_id = ");
    builder.push_bind(purchase_id);
    builder.push(" AND status IN (");
    let mut separated = builder.separated(", ");
    for status in statuses {
        separated.push_bind(*status);
    }
    separated.push_unseparated(")");
    let total: i64 = builder.build_query_scalar().fetch_one(conn).await?;
    Ok(MinorUnits::from(total))
}

/// Write the status reported by the processor. Re-applying the current status is a no-op; any other transition out of
/// a terminal status is rejected. Watermarked per refund.
pub(crate) async fn update_status(
    processor_refund_id: &str,
    status: RefundStatus,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<RefundRequest, SettlementError> {
    let refund = fetch_refund_by_processor_id(processor_refund_id, conn)
        .await?
        .ok_or_else(|| SettlementError::RefundNotFound(processor_refund_id.to_string()))?;
    if refund.status == status {
        return Ok(refund);
    }
    if refund.status.is_terminal() {
        return Err(SettlementError::invalid_transition(refund.status, status, "refund status is terminal"));
    }
    if let Some(applied) = refund.last_event_at {
        if event_at < applied {
            return Err(SettlementError::StaleEvent { applied, stale: event_at });
        }
    }
    sqlx::query(
        "UPDATE refunds SET status = $1, last_event_at = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3",
    )
    .bind(status)
    .bind(event_at)
    .bind(refund.id)
    .execute(&mut *conn)
    .await?;
    debug!("🗃️ Refund {processor_refund_id} moved to {status}");
    fetch_refund(refund.id, conn)
        .await?
        .ok_or_else(|| SettlementError::RefundNotFound(processor_refund_id.to_string()))
}
