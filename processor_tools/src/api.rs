use std::{sync::Arc, time::Duration};

use log::*;
use mps_common::MinorUnits;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    config::ProcessorConfig,
    data_objects::{
        AccountLink,
        AccountLinkType,
        Balance,
        DisputeEvidence,
        ListResponse,
        NewPaymentIntent,
        PaymentIntent,
        PaymentMethod,
        ProcessorAccount,
        ProcessorCustomer,
        ProcessorDispute,
        ProcessorRefund,
    },
    ProcessorApiError,
};

/// Retry budget for idempotent GETs. Mutating calls are never blind-retried here; callers attach idempotency keys
/// and decide for themselves.
const MAX_GET_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Clone)]
pub struct ProcessorApi {
    config: ProcessorConfig,
    client: Arc<Client>,
}

impl ProcessorApi {
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| ProcessorApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProcessorApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    /// Send a single REST request to the processor. Bodies are form-encoded, per the processor's API convention.
    /// Mutating requests should carry an `Idempotency-Key` so that network-level retries are safe.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, ProcessorApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method.clone(), url);
        if !params.is_empty() {
            if method == Method::GET {
                req = req.query(params);
            } else {
                req = req.form(params);
            }
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProcessorApiError::Timeout(e.to_string())
            } else {
                ProcessorApiError::RestResponseError(e.to_string())
            }
        })?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| ProcessorApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ProcessorApiError::RestResponseError(e.to_string()))?;
            Err(ProcessorApiError::QueryError { status, message })
        }
    }

    /// GETs are idempotent, so transient failures are retried with exponential backoff before giving up.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ProcessorApiError> {
        let mut attempt = 0;
        loop {
            match self.rest_query::<T>(Method::GET, path, params, None).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_GET_ATTEMPTS => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!("GET {path} failed ({e}). Retrying in {}ms", delay.as_millis());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    //----------------------------------      Customers       --------------------------------------------------------

    pub async fn create_customer(&self, email: &str) -> Result<ProcessorCustomer, ProcessorApiError> {
        let params = vec![("email".to_string(), email.to_string())];
        debug!("Creating processor customer");
        self.rest_query(Method::POST, "/customers", &params, Some(&idempotency_key())).await
    }

    /// Look up an existing customer by email. The processor may hold several; the most recent one wins.
    pub async fn find_customer_by_email(&self, email: &str) -> Result<Option<ProcessorCustomer>, ProcessorApiError> {
        let params = vec![("email".to_string(), email.to_string()), ("limit".to_string(), "1".to_string())];
        let result: ListResponse<ProcessorCustomer> = self.get_with_retry("/customers", &params).await?;
        Ok(result.data.into_iter().next())
    }

    //----------------------------------  Connected accounts  --------------------------------------------------------

    pub async fn create_account(
        &self,
        email: &str,
        country: &str,
        account_type: &str,
    ) -> Result<ProcessorAccount, ProcessorApiError> {
        let params = vec![
            ("email".to_string(), email.to_string()),
            ("country".to_string(), country.to_string()),
            ("type".to_string(), account_type.to_string()),
        ];
        debug!("Creating connected account in country {country}");
        self.rest_query(Method::POST, "/accounts", &params, Some(&idempotency_key())).await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorApiError> {
        let path = format!("/accounts/{account_id}");
        self.get_with_retry(&path, &[]).await
    }

    /// Account links are single-use and short-lived; they are always fetched fresh and never cached.
    pub async fn create_account_link(
        &self,
        account_id: &str,
        link_type: AccountLinkType,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, ProcessorApiError> {
        let params = vec![
            ("account".to_string(), account_id.to_string()),
            ("type".to_string(), link_type.as_str().to_string()),
            ("refresh_url".to_string(), refresh_url.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        debug!("Creating {} link for account {account_id}", link_type.as_str());
        self.rest_query(Method::POST, "/account_links", &params, None).await
    }

    pub async fn get_balance(&self, account_id: &str) -> Result<Balance, ProcessorApiError> {
        let params = vec![("account".to_string(), account_id.to_string())];
        self.get_with_retry("/balance", &params).await
    }

    //----------------------------------   Payment intents    --------------------------------------------------------

    pub async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        let mut params = vec![
            ("amount".to_string(), intent.amount.value().to_string()),
            ("currency".to_string(), intent.currency.clone()),
            ("customer".to_string(), intent.customer.clone()),
            ("application_fee_amount".to_string(), intent.application_fee_amount.value().to_string()),
            ("transfer_data[destination]".to_string(), intent.transfer_destination.clone()),
        ];
        for (k, v) in &intent.metadata {
            params.push((format!("metadata[{k}]"), v.clone()));
        }
        debug!("Creating payment intent for {} to {}", intent.amount, intent.transfer_destination);
        self.rest_query(Method::POST, "/payment_intents", &params, Some(idempotency_key)).await
    }

    pub async fn get_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorApiError> {
        let path = format!("/payment_intents/{intent_id}");
        self.get_with_retry(&path, &[]).await
    }

    pub async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<PaymentMethod>, ProcessorApiError> {
        let path = format!("/customers/{customer_id}/payment_methods");
        let result: ListResponse<PaymentMethod> = self.get_with_retry(&path, &[]).await?;
        Ok(result.data)
    }

    //----------------------------------       Refunds        --------------------------------------------------------

    pub async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: MinorUnits,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<ProcessorRefund, ProcessorApiError> {
        if !amount.is_positive() {
            return Err(ProcessorApiError::InvalidCurrencyAmount(amount.to_string()));
        }
        let params = vec![
            ("payment_intent".to_string(), payment_intent_id.to_string()),
            ("amount".to_string(), amount.value().to_string()),
            ("reason".to_string(), reason.to_string()),
        ];
        debug!("Requesting refund of {amount} against {payment_intent_id}");
        self.rest_query(Method::POST, "/refunds", &params, Some(idempotency_key)).await
    }

    /// Only legal while the processor-side refund is still pending; the processor enforces this.
    pub async fn cancel_refund(&self, refund_id: &str) -> Result<ProcessorRefund, ProcessorApiError> {
        let path = format!("/refunds/{refund_id}/cancel");
        debug!("Cancelling refund {refund_id}");
        self.rest_query(Method::POST, &path, &[], None).await
    }

    //----------------------------------       Disputes       --------------------------------------------------------

    pub async fn get_dispute(&self, dispute_id: &str) -> Result<ProcessorDispute, ProcessorApiError> {
        let path = format!("/disputes/{dispute_id}");
        self.get_with_retry(&path, &[]).await
    }

    pub async fn update_dispute(
        &self,
        dispute_id: &str,
        evidence: &DisputeEvidence,
    ) -> Result<ProcessorDispute, ProcessorApiError> {
        let path = format!("/disputes/{dispute_id}");
        let mut params = Vec::new();
        let mut push = |k: &str, v: &Option<String>| {
            if let Some(v) = v {
                params.push((format!("evidence[{k}]"), v.clone()));
            }
        };
        push("product_description", &evidence.product_description);
        push("customer_email_address", &evidence.customer_email_address);
        push("receipt", &evidence.receipt);
        push("uncategorized_text", &evidence.uncategorized_text);
        debug!("Submitting evidence for dispute {dispute_id}");
        self.rest_query(Method::POST, &path, &params, None).await
    }
}

/// A fresh idempotency key for a mutating call that has no natural local request id.
pub fn idempotency_key() -> String {
    format!("mps-{:032x}", rand::random::<u128>())
}
