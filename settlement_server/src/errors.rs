use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use settlement_engine::{PaymentEngineError, SettlementError, WebhookError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Authentication Error. {0}")]
    AuthenticationError(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error(transparent)]
    PaymentError(#[from] PaymentEngineError),
    #[error(transparent)]
    WebhookError(#[from] WebhookError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::PaymentError(e) => payment_error_status(e),
            Self::WebhookError(e) => webhook_error_status(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn payment_error_status(e: &PaymentEngineError) -> StatusCode {
    match e {
        PaymentEngineError::ValidationError(_) => StatusCode::BAD_REQUEST,
        PaymentEngineError::EvidenceWindowClosed { .. } => StatusCode::CONFLICT,
        PaymentEngineError::RefundNotCancellable(_) => StatusCode::CONFLICT,
        // Retryable processor failures are a bad gateway; the client may try the same request again.
        PaymentEngineError::ExternalServiceError { retryable: true, .. } => StatusCode::BAD_GATEWAY,
        PaymentEngineError::ExternalServiceError { retryable: false, .. } => StatusCode::INTERNAL_SERVER_ERROR,
        PaymentEngineError::Settlement(e) => settlement_error_status(e),
    }
}

fn settlement_error_status(e: &SettlementError) -> StatusCode {
    match e {
        SettlementError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SettlementError::PurchaseNotFound(_)
        | SettlementError::PurchaseNotFoundForIntent(_)
        | SettlementError::PayeeNotFound(_)
        | SettlementError::RefundNotFound(_)
        | SettlementError::DisputeNotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::PayeeNotEligible(_) => StatusCode::FORBIDDEN,
        SettlementError::InvalidTransition { .. }
        | SettlementError::StaleEvent { .. }
        | SettlementError::DuplicateEvent(_) => StatusCode::CONFLICT,
        SettlementError::InvalidAmount(_) | SettlementError::PurchaseNotRefundable(_) => StatusCode::BAD_REQUEST,
    }
}

/// Webhook deliveries only see a non-2xx for conditions redelivery can fix (or must alert on). Signature and payload
/// problems are the sender's fault; everything else asks the processor to try again later.
fn webhook_error_status(e: &WebhookError) -> StatusCode {
    match e {
        WebhookError::InvalidSignature(_) | WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        WebhookError::Settlement(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WebhookError::Processor(_) => StatusCode::BAD_GATEWAY,
    }
}
