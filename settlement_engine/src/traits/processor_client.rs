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
    ProcessorApiError,
};

use crate::db_types::{AccountType, RefundReason};

/// The subset of the processor API the settlement engine drives.
///
/// The live implementation wraps [`processor_tools::ProcessorApi`]; tests use a scripted double. Mutating calls take
/// an idempotency key derived from a local request id so that network-level retries are safe. All calls are bounded
/// by the client's request timeout; a call fails, it never hangs.
#[allow(async_fn_in_trait)]
pub trait ProcessorClient: Clone + Send + Sync {
    async fn create_customer(&self, email: &str) -> Result<ProcessorCustomer, ProcessorApiError>;

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<ProcessorCustomer>, ProcessorApiError>;

    async fn create_account(
        &self,
        email: &str,
        country: &str,
        account_type: AccountType,
    ) -> Result<ProcessorAccount, ProcessorApiError>;

    async fn get_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorApiError>;

    /// Single-use, short-lived URL for the processor's hosted onboarding/update flow. Never cached.
    async fn create_account_link(
        &self,
        account_id: &str,
        link_type: AccountLinkType,
    ) -> Result<AccountLink, ProcessorApiError>;

    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, ProcessorApiError>;

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: MinorUnits,
        reason: RefundReason,
        idempotency_key: &str,
    ) -> Result<ProcessorRefund, ProcessorApiError>;

    async fn cancel_refund(&self, refund_id: &str) -> Result<ProcessorRefund, ProcessorApiError>;

    async fn update_dispute(
        &self,
        dispute_id: &str,
        evidence: &DisputeEvidence,
    ) -> Result<ProcessorDispute, ProcessorApiError>;
}
