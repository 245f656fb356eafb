use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a request. Definitive "payment invalid" answers are
/// [`PaymentRejection`]s and travel in a successful response instead.
#[derive(Error, Debug)]
pub enum AirdropError {
    #[error("Task {task_index} of campaign {campaign_id} not found")]
    TaskNotFound { campaign_id: u64, task_index: u32 },

    #[error("Task {task_index} of campaign {campaign_id} does not accept payments")]
    TaskNotPayable { campaign_id: u64, task_index: u32 },

    #[error("Payment terms of task {task_index} in campaign {campaign_id} cannot be changed once set")]
    PaymentTermsImmutable { campaign_id: u64, task_index: u32 },

    #[error("Transaction {0} has already been used for another verification")]
    TransactionAlreadyUsed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("RPC error on {network}: {message}")]
    RpcError { network: String, message: String },

    #[error("RPC call to {network} timed out after {seconds}s")]
    RpcTimeout { network: String, seconds: u64 },

    #[error("Store error: {0}")]
    StoreError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AirdropError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AirdropError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
            AirdropError::TaskNotPayable { .. } => (StatusCode::BAD_REQUEST, "TASK_NOT_PAYABLE"),
            AirdropError::PaymentTermsImmutable { .. } => {
                (StatusCode::CONFLICT, "PAYMENT_TERMS_IMMUTABLE")
            }
            AirdropError::TransactionAlreadyUsed(_) => {
                (StatusCode::CONFLICT, "TRANSACTION_ALREADY_USED")
            }
            AirdropError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            AirdropError::RpcError { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            AirdropError::RpcTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            AirdropError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            AirdropError::StoreError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            AirdropError::SerializationError(_) | AirdropError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

/// A definitive negative answer from the payment verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentRejection {
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Transaction not found or still pending")]
    NotFoundOrPending,

    #[error("Transaction failed")]
    TransactionFailed,

    #[error("No Transfer event from token {token} found in transaction")]
    TransferEventNotFound { token: String },

    #[error("Wrong recipient: expected {expected}, got {actual}")]
    RecipientMismatch { expected: String, actual: String },

    #[error("Wrong amount: expected {expected}, got {actual}")]
    AmountMismatch { expected: String, actual: String },
}

impl PaymentRejection {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentRejection::UnsupportedNetwork(_) => "UNSUPPORTED_NETWORK",
            PaymentRejection::NotFoundOrPending => "NOT_FOUND_OR_PENDING",
            PaymentRejection::TransactionFailed => "TRANSACTION_FAILED",
            PaymentRejection::TransferEventNotFound { .. } => "TRANSFER_EVENT_NOT_FOUND",
            PaymentRejection::RecipientMismatch { .. } => "RECIPIENT_MISMATCH",
            PaymentRejection::AmountMismatch { .. } => "AMOUNT_MISMATCH",
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub verified: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for AirdropError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status, error_code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code, request_id = %request_id, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code, request_id = %request_id, "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            verified: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AirdropError>;
