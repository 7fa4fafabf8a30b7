use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Processor call timed out: {0}")]
    Timeout(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Invalid currency amount: {0}")]
    InvalidCurrencyAmount(String),
}

impl ProcessorApiError {
    /// Timeouts and processor-side failures may be retried for idempotent calls. Anything else is a caller bug or a
    /// definitive rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessorApiError::Timeout(_) => true,
            ProcessorApiError::QueryError { status, .. } => *status >= 500,
            ProcessorApiError::RestResponseError(_) => true,
            _ => false,
        }
    }
}
