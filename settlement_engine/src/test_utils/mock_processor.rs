//! A scripted stand-in for the live processor client.
//!
//! Fabricates plausible processor objects with sequential ids, remembers what it created so that tests can assert
//! against it, and can be told to fail its next call to exercise the timeout paths.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

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

use crate::{db_types::AccountType, traits::ProcessorClient};

#[derive(Default)]
struct MockState {
    next_id: u64,
    fail_next: bool,
    accounts: HashMap<String, ProcessorAccount>,
    customers: HashMap<String, ProcessorCustomer>,
    intents: Vec<PaymentIntent>,
    refunds: HashMap<String, ProcessorRefund>,
    refund_keys: HashMap<String, String>,
    disputes: HashMap<String, ProcessorDispute>,
    calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockProcessor {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next client call fails with a timeout instead of doing anything.
    pub fn fail_next_call(&self) {
        self.lock().fail_next = true;
    }

    /// Flip the capability flags of a fabricated account, as if the payee had completed (or failed) onboarding.
    pub fn set_account_state(&self, account_id: &str, charges: bool, payouts: bool, details: bool) {
        let mut state = self.lock();
        if let Some(account) = state.accounts.get_mut(account_id) {
            account.charges_enabled = charges;
            account.payouts_enabled = payouts;
            account.details_submitted = details;
        }
    }

    /// Register a dispute object so that `update_dispute` has something to return.
    pub fn seed_dispute(&self, dispute: ProcessorDispute) {
        self.lock().disputes.insert(dispute.id.clone(), dispute);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn created_intents(&self) -> Vec<PaymentIntent> {
        self.lock().intents.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    fn begin(&self, call: &str) -> Result<std::sync::MutexGuard<'_, MockState>, ProcessorApiError> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.fail_next {
            state.fail_next = false;
            return Err(ProcessorApiError::Timeout(format!("scripted timeout in {call}")));
        }
        Ok(state)
    }
}

fn next(state: &mut MockState, prefix: &str) -> String {
    state.next_id += 1;
    format!("{prefix}_{}", state.next_id)
}

impl ProcessorClient for MockProcessor {
    async fn create_customer(&self, email: &str) -> Result<ProcessorCustomer, ProcessorApiError> {
        let mut state = self.begin("create_customer")?;
        let id = next(&mut state, "cus");
        let customer = ProcessorCustomer { id, email: Some(email.to_string()) };
        state.customers.insert(email.to_string(), customer.clone());
        Ok(customer)
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<ProcessorCustomer>, ProcessorApiError> {
        let state = self.begin("find_customer_by_email")?;
        Ok(state.customers.get(email).cloned())
    }

    async fn create_account(
        &self,
        email: &str,
        country: &str,
        account_type: AccountType,
    ) -> Result<ProcessorAccount, ProcessorApiError> {
        let mut state = self.begin("create_account")?;
        let id = next(&mut state, "acct");
        let account = ProcessorAccount {
            id: id.clone(),
            email: Some(email.to_string()),
            country: country.to_string(),
            account_type: account_type.to_string(),
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
            disabled_reason: None,
        };
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorApiError> {
        let state = self.begin("get_account")?;
        state
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| ProcessorApiError::QueryError { status: 404, message: format!("no such account: {account_id}") })
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        link_type: AccountLinkType,
    ) -> Result<AccountLink, ProcessorApiError> {
        let _state = self.begin("create_account_link")?;
        Ok(AccountLink {
            url: format!("https://connect.cardworks.example/{}/{account_id}", link_type.as_str()),
            expires_at: None,
        })
    }

    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        _idempotency_key: &str,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        let mut state = self.begin("create_payment_intent")?;
        let id = next(&mut state, "pi");
        let created = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            amount: intent.amount,
            currency: intent.currency.clone(),
            status: "requires_payment_method".to_string(),
            customer: Some(intent.customer.clone()),
            application_fee_amount: Some(intent.application_fee_amount),
            transfer_destination: Some(intent.transfer_destination.clone()),
            metadata: intent.metadata.clone(),
        };
        state.intents.push(created.clone());
        Ok(created)
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: MinorUnits,
        reason: crate::db_types::RefundReason,
        idempotency_key: &str,
    ) -> Result<ProcessorRefund, ProcessorApiError> {
        let mut state = self.begin("create_refund")?;
        // A repeated idempotency key returns the original refund, as the live processor would.
        if let Some(existing) = state.refund_keys.get(idempotency_key) {
            let refund = state.refunds[existing].clone();
            return Ok(refund);
        }
        let id = next(&mut state, "re");
        state.refund_keys.insert(idempotency_key.to_string(), id.clone());
        let refund = ProcessorRefund {
            id: id.clone(),
            payment_intent: payment_intent_id.to_string(),
            amount,
            status: "pending".to_string(),
            reason: Some(reason.to_string()),
        };
        state.refunds.insert(id, refund.clone());
        Ok(refund)
    }

    async fn cancel_refund(&self, refund_id: &str) -> Result<ProcessorRefund, ProcessorApiError> {
        let mut state = self.begin("cancel_refund")?;
        let refund = state
            .refunds
            .get_mut(refund_id)
            .ok_or_else(|| ProcessorApiError::QueryError { status: 404, message: format!("no such refund: {refund_id}") })?;
        refund.status = "canceled".to_string();
        Ok(refund.clone())
    }

    async fn update_dispute(
        &self,
        dispute_id: &str,
        _evidence: &DisputeEvidence,
    ) -> Result<ProcessorDispute, ProcessorApiError> {
        let mut state = self.begin("update_dispute")?;
        let dispute = state
            .disputes
            .get_mut(dispute_id)
            .ok_or_else(|| ProcessorApiError::QueryError { status: 404, message: format!("no such dispute: {dispute_id}") })?;
        dispute.status = "under_review".to_string();
        Ok(dispute.clone())
    }
}
