use chrono::{DateTime, Utc};
use processor_tools::{webhook::WebhookSignatureError, ProcessorApiError};
use thiserror::Error;

use crate::{commission::CommissionError, db_types::RefundStatus, traits::SettlementError};

/// Errors surfaced by the engine's public API layer.
#[derive(Debug, Error)]
pub enum PaymentEngineError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    /// The processor call failed or timed out. `retryable` tells the caller whether trying the same request again
    /// (with the same idempotency key) makes sense.
    #[error("The payment processor could not complete the request: {message}")]
    ExternalServiceError { message: String, retryable: bool },
    #[error("The evidence submission window closed at {due}")]
    EvidenceWindowClosed { due: DateTime<Utc> },
    #[error("A refund in status {0} can no longer be cancelled")]
    RefundNotCancellable(RefundStatus),
}

impl From<ProcessorApiError> for PaymentEngineError {
    fn from(e: ProcessorApiError) -> Self {
        let retryable = e.is_retryable();
        PaymentEngineError::ExternalServiceError { message: e.to_string(), retryable }
    }
}

impl From<CommissionError> for PaymentEngineError {
    fn from(e: CommissionError) -> Self {
        PaymentEngineError::ValidationError(e.to_string())
    }
}

/// Errors surfaced by the webhook reconciler. Anything that maps to a non-2xx response lives here; everything the
/// reconciler can safely acknowledge is swallowed and logged instead.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook signature rejected: {0}")]
    InvalidSignature(#[from] WebhookSignatureError),
    #[error("Webhook payload is malformed: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("Processor call during reconciliation failed: {0}")]
    Processor(String),
}

impl From<ProcessorApiError> for WebhookError {
    fn from(e: ProcessorApiError) -> Self {
        WebhookError::Processor(e.to_string())
    }
}
