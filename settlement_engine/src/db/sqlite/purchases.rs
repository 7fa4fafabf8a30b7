use chrono::{DateTime, Utc};
use log::{debug, warn};
use mps_common::MinorUnits;
use sqlx::SqliteConnection;

use crate::{
    commission::CommissionSplit,
    db_types::{NewPurchase, PaymentIntentId, Purchase, PurchaseStatus},
    traits::SettlementError,
};

const PURCHASE_COLUMNS: &str = r#"
    id,
    buyer_id,
    app_id,
    payee_id,
    gross_amount,
    processor_fee,
    platform_fee,
    payee_amount,
    payment_intent_id,
    status,
    prior_status,
    failure_reason,
    last_event_at,
    created_at,
    updated_at
"#;

pub async fn insert_purchase(
    purchase: NewPurchase,
    split: CommissionSplit,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    debug_assert_eq!(split.processor_fee + split.platform_fee + split.payee_amount, split.gross);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO purchases (buyer_id, app_id, payee_id, gross_amount, processor_fee, platform_fee, payee_amount)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&purchase.buyer_id)
    .bind(&purchase.app_id)
    .bind(&purchase.payee_id)
    .bind(split.gross)
    .bind(split.processor_fee)
    .bind(split.platform_fee)
    .bind(split.payee_amount)
    .fetch_one(&mut *conn)
    .await?;
    debug!("🗃️ Purchase #{id} opened for {} to payee {}", split.gross, purchase.payee_id);
    fetch_purchase(id, conn).await?.ok_or(SettlementError::PurchaseNotFound(id))
}

pub async fn fetch_purchase(id: i64, conn: &mut SqliteConnection) -> Result<Option<Purchase>, SettlementError> {
    let q = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1");
    let purchase = sqlx::query_as::<_, Purchase>(&q).bind(id).fetch_optional(conn).await?;
    Ok(purchase)
}

pub async fn fetch_purchase_by_intent(
    intent_id: &PaymentIntentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Purchase>, SettlementError> {
    let q = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE payment_intent_id = $1");
    let purchase = sqlx::query_as::<_, Purchase>(&q).bind(intent_id).fetch_optional(conn).await?;
    Ok(purchase)
}

pub async fn attach_payment_intent(
    purchase_id: i64,
    intent_id: &PaymentIntentId,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    let res =
        sqlx::query("UPDATE purchases SET payment_intent_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
            .bind(intent_id)
            .bind(purchase_id)
            .execute(conn)
            .await?;
    if res.rows_affected() == 0 {
        return Err(SettlementError::PurchaseNotFound(purchase_id));
    }
    Ok(())
}

/// Reject events that arrive behind the per-purchase causal watermark.
fn check_watermark(last_event_at: Option<DateTime<Utc>>, event_at: DateTime<Utc>) -> Result<(), SettlementError> {
    match last_event_at {
        Some(applied) if event_at < applied => Err(SettlementError::StaleEvent { applied, stale: event_at }),
        _ => Ok(()),
    }
}

async fn write_status(
    purchase_id: i64,
    status: PurchaseStatus,
    event_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    sqlx::query(
        r#"
        UPDATE purchases
        SET status = $1, last_event_at = COALESCE($2, last_event_at), updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        "#,
    )
    .bind(status)
    .bind(event_at)
    .bind(purchase_id)
    .execute(&mut *conn)
    .await?;
    fetch_purchase(purchase_id, conn).await?.ok_or(SettlementError::PurchaseNotFound(purchase_id))
}

/// `pending → completed` on a verified charge confirmation. Idempotent when already completed; a completion arriving
/// after a failure is causally impossible and is rejected.
pub(crate) async fn mark_completed(
    intent_id: &PaymentIntentId,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    let purchase = fetch_purchase_by_intent(intent_id, conn)
        .await?
        .ok_or_else(|| SettlementError::PurchaseNotFoundForIntent(intent_id.clone()))?;
    match purchase.status {
        PurchaseStatus::Completed => Ok(purchase),
        PurchaseStatus::Pending => {
            check_watermark(purchase.last_event_at, event_at)?;
            let updated = write_status(purchase.id, PurchaseStatus::Completed, Some(event_at), conn).await?;
            debug!("🗃️ Purchase #{} completed ({})", updated.id, updated.gross_amount);
            Ok(updated)
        },
        status => Err(SettlementError::invalid_transition(
            status,
            PurchaseStatus::Completed,
            "charge success reported for a purchase that already left the pending state",
        )),
    }
}

/// `pending → failed`. Idempotent.
pub(crate) async fn mark_failed(
    intent_id: &PaymentIntentId,
    reason: &str,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    let purchase = fetch_purchase_by_intent(intent_id, conn)
        .await?
        .ok_or_else(|| SettlementError::PurchaseNotFoundForIntent(intent_id.clone()))?;
    match purchase.status {
        PurchaseStatus::Failed => Ok(purchase),
        PurchaseStatus::Pending => {
            check_watermark(purchase.last_event_at, event_at)?;
            sqlx::query("UPDATE purchases SET failure_reason = $1 WHERE id = $2")
                .bind(reason)
                .bind(purchase.id)
                .execute(&mut *conn)
                .await?;
            let updated = write_status(purchase.id, PurchaseStatus::Failed, Some(event_at), conn).await?;
            warn!("🗃️ Purchase #{} failed: {reason}", updated.id);
            Ok(updated)
        },
        status => Err(SettlementError::invalid_transition(
            status,
            PurchaseStatus::Failed,
            "charge failure reported for a purchase that already left the pending state",
        )),
    }
}

pub(crate) async fn mark_failed_local(
    purchase_id: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    let purchase = fetch_purchase(purchase_id, conn).await?.ok_or(SettlementError::PurchaseNotFound(purchase_id))?;
    match purchase.status {
        PurchaseStatus::Failed => Ok(purchase),
        PurchaseStatus::Pending => {
            sqlx::query("UPDATE purchases SET failure_reason = $1 WHERE id = $2")
                .bind(reason)
                .bind(purchase.id)
                .execute(&mut *conn)
                .await?;
            write_status(purchase.id, PurchaseStatus::Failed, None, conn).await
        },
        status => Err(SettlementError::invalid_transition(status, PurchaseStatus::Failed, "purchase is not pending")),
    }
}

/// Recompute settlement status after a refund succeeds. `refunded_total` is the cumulative succeeded amount,
/// including the refund that just landed.
pub(crate) async fn apply_refund(
    purchase: &Purchase,
    refunded_total: MinorUnits,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    if refunded_total > purchase.gross_amount {
        return Err(SettlementError::InvalidAmount(format!(
            "cumulative refunds of {refunded_total} would exceed the gross amount {}",
            purchase.gross_amount
        )));
    }
    match purchase.status {
        PurchaseStatus::Completed | PurchaseStatus::PartiallyRefunded | PurchaseStatus::Disputed => {
            let status = if refunded_total == purchase.gross_amount {
                PurchaseStatus::Refunded
            } else {
                PurchaseStatus::PartiallyRefunded
            };
            let updated = write_status(purchase.id, status, Some(event_at), conn).await?;
            debug!("🗃️ Purchase #{} is now {status} ({refunded_total} refunded)", purchase.id);
            Ok(updated)
        },
        status => Err(SettlementError::PurchaseNotRefundable(status)),
    }
}

/// Flag the purchase while a dispute is open, remembering the settlement status to restore on a win.
pub(crate) async fn mark_disputed(
    purchase_id: i64,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    let purchase = fetch_purchase(purchase_id, conn).await?.ok_or(SettlementError::PurchaseNotFound(purchase_id))?;
    match purchase.status {
        PurchaseStatus::Disputed => Ok(purchase),
        PurchaseStatus::Completed | PurchaseStatus::PartiallyRefunded | PurchaseStatus::Refunded => {
            check_watermark(purchase.last_event_at, event_at)?;
            sqlx::query("UPDATE purchases SET prior_status = $1 WHERE id = $2")
                .bind(purchase.status)
                .bind(purchase.id)
                .execute(&mut *conn)
                .await?;
            write_status(purchase.id, PurchaseStatus::Disputed, Some(event_at), conn).await
        },
        status => Err(SettlementError::invalid_transition(
            status,
            PurchaseStatus::Disputed,
            "disputes only arise against settled purchases",
        )),
    }
}

/// Resolve the disputed flag. A win restores the prior settlement status. A loss keeps the row in `disputed`: the
/// processor has already debited the connected account, so the forfeiture is recorded, not clawed back.
pub(crate) async fn clear_dispute(
    purchase_id: i64,
    won: bool,
    event_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Purchase, SettlementError> {
    let purchase = fetch_purchase(purchase_id, conn).await?.ok_or(SettlementError::PurchaseNotFound(purchase_id))?;
    if purchase.status != PurchaseStatus::Disputed {
        return Err(SettlementError::invalid_transition(
            purchase.status,
            if won { "dispute won" } else { "dispute lost" },
            "purchase has no open dispute",
        ));
    }
    check_watermark(purchase.last_event_at, event_at)?;
    if won {
        let restored = purchase.prior_status.unwrap_or(PurchaseStatus::Completed);
        debug!("🗃️ Dispute won; purchase #{} restored to {restored}", purchase.id);
        write_status(purchase.id, restored, Some(event_at), conn).await
    } else {
        warn!("🗃️ Dispute lost; gross amount of purchase #{} is forfeited", purchase.id);
        write_status(purchase.id, PurchaseStatus::Disputed, Some(event_at), conn).await
    }
}
