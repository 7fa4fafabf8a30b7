use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayeeAccount, PayeeAccount, PayeeStateUpdate},
    traits::SettlementError,
};

const PAYEE_COLUMNS: &str = r#"
    id,
    owner_id,
    processor_account_id,
    account_type,
    charges_enabled,
    payouts_enabled,
    details_submitted,
    verification_status,
    created_at,
    updated_at
"#;

/// Insert a payee account, or refresh the processor linkage if the owner already has one. One active payee account
/// per owner is the rule that makes onboarding retries safe.
pub async fn upsert(payee: NewPayeeAccount, conn: &mut SqliteConnection) -> Result<PayeeAccount, SettlementError> {
    sqlx::query(
        r#"
        INSERT INTO payee_accounts (owner_id, processor_account_id, account_type)
        VALUES ($1, $2, $3)
        ON CONFLICT (owner_id) DO UPDATE SET
            processor_account_id = excluded.processor_account_id,
            account_type = excluded.account_type,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&payee.owner_id)
    .bind(&payee.processor_account_id)
    .bind(payee.account_type)
    .execute(&mut *conn)
    .await?;
    debug!("🗃️ Payee account for owner {} upserted", payee.owner_id);
    fetch_by_owner(&payee.owner_id, conn)
        .await?
        .ok_or_else(|| SettlementError::PayeeNotFound(payee.owner_id.clone()))
}

pub async fn fetch_by_owner(
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PayeeAccount>, SettlementError> {
    let q = format!("SELECT {PAYEE_COLUMNS} FROM payee_accounts WHERE owner_id = $1");
    let payee = sqlx::query_as::<_, PayeeAccount>(&q).bind(owner_id).fetch_optional(conn).await?;
    Ok(payee)
}

pub async fn fetch_by_processor_id(
    processor_account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PayeeAccount>, SettlementError> {
    let q = format!("SELECT {PAYEE_COLUMNS} FROM payee_accounts WHERE processor_account_id = $1");
    let payee = sqlx::query_as::<_, PayeeAccount>(&q).bind(processor_account_id).fetch_optional(conn).await?;
    Ok(payee)
}

/// Overwrite capability state with what the processor reports. The processor is authoritative; local state is only
/// a mirror, so every field is written unconditionally.
pub async fn update_state(
    processor_account_id: &str,
    update: PayeeStateUpdate,
    conn: &mut SqliteConnection,
) -> Result<PayeeAccount, SettlementError> {
    let res = sqlx::query(
        r#"
        UPDATE payee_accounts SET
            charges_enabled = $1,
            payouts_enabled = $2,
            details_submitted = $3,
            verification_status = $4,
            updated_at = CURRENT_TIMESTAMP
        WHERE processor_account_id = $5
        "#,
    )
    .bind(update.charges_enabled)
    .bind(update.payouts_enabled)
    .bind(update.details_submitted)
    .bind(update.verification_status)
    .bind(processor_account_id)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(SettlementError::PayeeNotFound(processor_account_id.to_string()));
    }
    debug!("🗃️ Payee account {processor_account_id} capability state refreshed");
    fetch_by_processor_id(processor_account_id, conn)
        .await?
        .ok_or_else(|| SettlementError::PayeeNotFound(processor_account_id.to_string()))
}
