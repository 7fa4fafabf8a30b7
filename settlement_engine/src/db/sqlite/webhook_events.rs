use chrono::Duration;
use log::debug;
use sqlx::SqliteConnection;

use crate::traits::SettlementError;

/// Record an event id. Returns `true` on first sight, `false` for a redelivery.
pub async fn record_event(event_id: &str, conn: &mut SqliteConnection) -> Result<bool, SettlementError> {
    let res = sqlx::query("INSERT OR IGNORE INTO webhook_events (event_id) VALUES ($1)")
        .bind(event_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Drop seen-event records older than `older_than`. The retention window must exceed the processor's maximum
/// redelivery window or dedup is defeated.
pub async fn purge_older_than(older_than: Duration, conn: &mut SqliteConnection) -> Result<u64, SettlementError> {
    let modifier = format!("-{} seconds", older_than.num_seconds().max(0));
    let res = sqlx::query("DELETE FROM webhook_events WHERE received_at < datetime('now', $1)")
        .bind(modifier)
        .execute(conn)
        .await?;
    let purged = res.rows_affected();
    if purged > 0 {
        debug!("🗃️ Purged {purged} seen webhook events");
    }
    Ok(purged)
}
