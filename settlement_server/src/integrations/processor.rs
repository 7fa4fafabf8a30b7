//! The live implementation of the engine's `ProcessorClient` trait, backed by the REST client in `processor_tools`.
//!
//! The only state this adapter adds to the raw client is the pair of return/refresh URLs that hosted account-link
//! flows need, which are deployment configuration rather than anything the engine should know about.

use mps_common::MinorUnits;
use processor_tools::{
    data_objects::{
        AccountLink,
        AccountLinkType,
        DisputeEvidence,
        NewPaymentIntent,
        PaymentIntent,
        ProcessorAccount,
        ProcessorCustomer,
        ProcessorDispute,
        ProcessorRefund,
    },
    ProcessorApi,
    ProcessorApiError,
};
use settlement_engine::{
    db_types::{AccountType, RefundReason},
    ProcessorClient,
};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct PaymentGateway {
    api: ProcessorApi,
    refresh_url: String,
    return_url: String,
}

impl PaymentGateway {
    pub fn new(config: &ServerConfig) -> Result<Self, ProcessorApiError> {
        let api = ProcessorApi::new(config.processor.clone())?;
        Ok(Self {
            api,
            refresh_url: config.onboarding_refresh_url.clone(),
            return_url: config.onboarding_return_url.clone(),
        })
    }
}

impl ProcessorClient for PaymentGateway {
    async fn create_customer(&self, email: &str) -> Result<ProcessorCustomer, ProcessorApiError> {
        self.api.create_customer(email).await
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<ProcessorCustomer>, ProcessorApiError> {
        self.api.find_customer_by_email(email).await
    }

    async fn create_account(
        &self,
        email: &str,
        country: &str,
        account_type: AccountType,
    ) -> Result<ProcessorAccount, ProcessorApiError> {
        self.api.create_account(email, country, &account_type.to_string()).await
    }

    async fn get_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorApiError> {
        self.api.get_account(account_id).await
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        link_type: AccountLinkType,
    ) -> Result<AccountLink, ProcessorApiError> {
        self.api.create_account_link(account_id, link_type, &self.refresh_url, &self.return_url).await
    }

    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        self.api.create_payment_intent(intent, idempotency_key).await
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: MinorUnits,
        reason: RefundReason,
        idempotency_key: &str,
    ) -> Result<ProcessorRefund, ProcessorApiError> {
        self.api.create_refund(payment_intent_id, amount, reason.as_str(), idempotency_key).await
    }

    async fn cancel_refund(&self, refund_id: &str) -> Result<ProcessorRefund, ProcessorApiError> {
        self.api.cancel_refund(refund_id).await
    }

    async fn update_dispute(
        &self,
        dispute_id: &str,
        evidence: &DisputeEvidence,
    ) -> Result<ProcessorDispute, ProcessorApiError> {
        self.api.update_dispute(dispute_id, evidence).await
    }
}
