use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{DisputeCase, DisputeStatus, NewDispute},
    traits::SettlementError,
};

const DISPUTE_COLUMNS: &str = r#"
    id,
    purchase_id,
    processor_dispute_id,
    amount,
    reason,
    status,
    evidence_due_by,
    last_event_at,
    created_at,
    updated_at
"#;

/// Create the dispute case if it is not already on record. Returns the row plus a flag telling the caller whether
/// this insert created it (and hence whether the purchase still needs flagging).
pub async fn upsert_dispute(
    purchase_id: i64,
    dispute: &NewDispute,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(DisputeCase, bool), SettlementError> {
    let res = sqlx::query(
        r#"
        INSERT INTO disputes (purchase_id, processor_dispute_id, amount, reason, status, evidence_due_by, last_event_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (processor_dispute_id) DO NOTHING
        "#,
    )
    .bind(purchase_id)
    .bind(&dispute.processor_dispute_id)
    .bind(dispute.amount)
    .bind(&dispute.reason)
    .bind(dispute.status)
    .bind(dispute.evidence_due_by)
    .bind(event_at)
    .execute(&mut *conn)
    .await?;
    let created = res.rows_affected() > 0;
    if created {
        debug!("🗃️ Dispute {} opened against purchase #{purchase_id} for {}", dispute.processor_dispute_id, dispute.amount);
    }
    let case = fetch_dispute_by_processor_id(&dispute.processor_dispute_id, conn)
        .await?
        .ok_or_else(|| SettlementError::DisputeNotFound(dispute.processor_dispute_id.clone()))?;
    Ok((case, created))
}

pub async fn fetch_dispute(id: i64, conn: &mut SqliteConnection) -> Result<Option<DisputeCase>, SettlementError> {
    let q = format!("SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1");
    let dispute = sqlx::query_as::<_, DisputeCase>(&q).bind(id).fetch_optional(conn).await?;
    Ok(dispute)
}

pub async fn fetch_dispute_by_processor_id(
    processor_dispute_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<DisputeCase>, SettlementError> {
    let q = format!("SELECT {DISPUTE_COLUMNS} FROM disputes WHERE processor_dispute_id = $1");
    let dispute = sqlx::query_as::<_, DisputeCase>(&q).bind(processor_dispute_id).fetch_optional(conn).await?;
    Ok(dispute)
}

/// Write the status the processor reports, updating the evidence deadline when one is supplied. `won` and `lost` are
/// immutable; re-applying the current status is a no-op.
pub(crate) async fn update_status(
    processor_dispute_id: &str,
    status: DisputeStatus,
    evidence_due_by: Option<DateTime<Utc>>,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DisputeCase, SettlementError> {
    let dispute = fetch_dispute_by_processor_id(processor_dispute_id, conn)
        .await?
        .ok_or_else(|| SettlementError::DisputeNotFound(processor_dispute_id.to_string()))?;
    if dispute.status == status {
        return Ok(dispute);
    }
    if dispute.status.is_terminal() {
        return Err(SettlementError::invalid_transition(dispute.status, status, "dispute has been decided"));
    }
    if let Some(applied) = dispute.last_event_at {
        if event_at < applied {
            return Err(SettlementError::StaleEvent { applied, stale: event_at });
        }
    }
    sqlx::query(
        r#"
        UPDATE disputes
        SET status = $1, evidence_due_by = COALESCE($2, evidence_due_by), last_event_at = $3,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4
        "#,
    )
    .bind(status)
    .bind(evidence_due_by)
    .bind(event_at)
    .bind(dispute.id)
    .execute(&mut *conn)
    .await?;
    debug!("🗃️ Dispute {processor_dispute_id} moved to {status}");
    fetch_dispute(dispute.id, conn)
        .await?
        .ok_or_else(|| SettlementError::DisputeNotFound(processor_dispute_id.to_string()))
}
