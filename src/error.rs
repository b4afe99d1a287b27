use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to API callers. Every failure in a handler ends up as
/// exactly one of these.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),
    #[error("Throttling: {message}")]
    Throttling {
        message: String,
        retry_after: Duration,
    },
    #[error("Message rejected: {0}")]
    MessageRejected(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn throttled(message: impl Into<String>, retry_after: Duration) -> Self {
        ApiError::Throttling {
            message: message.into(),
            retry_after,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameterValue(_) => StatusCode::BAD_REQUEST,
            ApiError::Throttling { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MessageRejected(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        let code = err.status_code().as_u16();
        match err {
            ApiError::InvalidParameterValue(msg) => Self::new("InvalidParameterValue", msg, code),
            ApiError::Throttling { message, .. } => Self::new("Throttling", message, code),
            ApiError::MessageRejected(msg) => Self::new("MessageRejected", msg, code),
            ApiError::InternalError(msg) => Self::new("InternalError", msg, code),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_api_error(&self);
        let mut response = (self.status_code(), Json(body)).into_response();

        if let ApiError::Throttling { retry_after, .. } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*retry_after)));
        }

        response
    }
}

/// Whole seconds to advertise in `Retry-After`, never less than one.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait
        .as_secs()
        .saturating_add(u64::from(wait.subsec_nanos() > 0));
    secs.max(1)
}

/// Failures reading or rewriting the email log.
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("email log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("email log is not a valid record list: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failures reported by a delivery provider.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("missing provider credentials: {0}")]
    Credentials(String),
    #[error("request signing failed: {0}")]
    Signing(String),
    #[error("invalid provider endpoint: {0}")]
    Endpoint(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),
}
