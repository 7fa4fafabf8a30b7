use crate::{
    db_types::{NewPayeeAccount, PayeeAccount, PayeeStateUpdate},
    traits::SettlementError,
};

/// Storage contract for the payee account registry.
///
/// One active payee account per owner: `upsert_payee_account` keys on `owner_id`, which is what makes accidental
/// double account creation impossible even when onboarding is retried.
#[allow(async_fn_in_trait)]
pub trait PayeeAccountManagement {
    /// Insert the payee account, or update the processor account id and type if a row for this owner already exists.
    async fn upsert_payee_account(&self, payee: NewPayeeAccount) -> Result<PayeeAccount, SettlementError>;

    async fn fetch_payee_by_owner(&self, owner_id: &str) -> Result<Option<PayeeAccount>, SettlementError>;

    async fn fetch_payee_by_processor_id(
        &self,
        processor_account_id: &str,
    ) -> Result<Option<PayeeAccount>, SettlementError>;

    /// Overwrite the capability flags with fresh processor state. Idempotent; safe to call repeatedly.
    async fn update_payee_state(
        &self,
        processor_account_id: &str,
        update: PayeeStateUpdate,
    ) -> Result<PayeeAccount, SettlementError>;
}
