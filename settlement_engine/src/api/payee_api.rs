//! Payee account registry API.

use std::fmt::Debug;

use log::*;
use processor_tools::data_objects::{AccountLink, AccountLinkType};

use crate::{
    api::errors::PaymentEngineError,
    db_types::{AccountType, NewPayeeAccount, PayeeAccount, PayeeStateUpdate},
    traits::{PayeeAccountManagement, ProcessorClient, SettlementError},
};

/// `PayeeApi` manages the registry of developers' connected payout accounts: onboarding them with the processor,
/// mirroring their capability state locally, and minting hosted-flow links.
pub struct PayeeApi<B, C> {
    db: B,
    client: C,
}

impl<B, C> Debug for PayeeApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayeeApi")
    }
}

impl<B, C> PayeeApi<B, C>
where
    B: PayeeAccountManagement,
    C: ProcessorClient,
{
    pub fn new(db: B, client: C) -> Self {
        Self { db, client }
    }

    /// Start (or resume) onboarding for `owner_id`.
    ///
    /// If the owner already has a payee account, no new processor account is created; a fresh onboarding link for
    /// the existing account is returned instead, which is what makes retries safe. The local row is only written
    /// after the processor call succeeds, so a processor failure leaves no state behind.
    pub async fn begin_onboarding(
        &self,
        owner_id: &str,
        email: &str,
        country: &str,
        account_type: AccountType,
    ) -> Result<(PayeeAccount, AccountLink), PaymentEngineError> {
        let payee = match self.db.fetch_payee_by_owner(owner_id).await? {
            Some(existing) => {
                info!("🔄️🧑️ Owner {owner_id} already has payee account {}. Reissuing an onboarding link.", existing.processor_account_id);
                existing
            },
            None => {
                let account = self.client.create_account(email, country, account_type).await?;
                let new_payee = NewPayeeAccount {
                    owner_id: owner_id.to_string(),
                    processor_account_id: account.id.clone(),
                    account_type,
                };
                let payee = self.db.upsert_payee_account(new_payee).await?;
                debug!("🔄️🧑️ Created payee account {} for owner {owner_id}", account.id);
                payee
            },
        };
        let link = self.client.create_account_link(&payee.processor_account_id, AccountLinkType::Onboarding).await?;
        Ok((payee, link))
    }

    /// Pull the account's current state from the processor and overwrite the local mirror with it.
    pub async fn refresh_account_status(&self, owner_id: &str) -> Result<PayeeAccount, PaymentEngineError> {
        let payee = self
            .db
            .fetch_payee_by_owner(owner_id)
            .await?
            .ok_or_else(|| SettlementError::PayeeNotFound(owner_id.to_string()))?;
        let account = self.client.get_account(&payee.processor_account_id).await?;
        let update = PayeeStateUpdate::from(&account);
        let payee = self.db.update_payee_state(&payee.processor_account_id, update).await?;
        debug!("🔄️🧑️ Refreshed payee {} to {}", payee.processor_account_id, payee.verification_status);
        Ok(payee)
    }

    pub async fn get_account(&self, owner_id: &str) -> Result<Option<PayeeAccount>, PaymentEngineError> {
        Ok(self.db.fetch_payee_by_owner(owner_id).await?)
    }

    /// Mint a fresh hosted-flow link for an account that needs to update its details. Links are single-use and
    /// short-lived, so they are never cached or stored.
    pub async fn create_reauth_link(&self, owner_id: &str) -> Result<AccountLink, PaymentEngineError> {
        let payee = self
            .db
            .fetch_payee_by_owner(owner_id)
            .await?
            .ok_or_else(|| SettlementError::PayeeNotFound(owner_id.to_string()))?;
        let link = self.client.create_account_link(&payee.processor_account_id, AccountLinkType::Update).await?;
        Ok(link)
    }
}
