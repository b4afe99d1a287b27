use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::rate_limiter::ClientRateLimiter;
use crate::response::{MessageResponse, SendEmailResponse, StatsResponse};
use crate::validation::SendEmailRequest;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub mailer: Arc<Mailer>,
    pub limiter: ClientRateLimiter,
}

impl AppState {
    pub fn new(mailer: Mailer, limiter: ClientRateLimiter) -> Self {
        Self {
            mailer: Arc::new(mailer),
            limiter,
        }
    }
}

/// `POST /send-email`
pub async fn send_email(
    State(state): State<AppState>,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "Rejected send payload");
        ApiError::InvalidParameterValue(
            "Invalid email format. Please provide a valid JSON.".to_string(),
        )
    })?;

    let receipt = state.mailer.send(request).await?;
    Ok(Json(SendEmailResponse::accepted(receipt)))
}

/// `GET /stats`
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.mailer.quota_status()))
}

/// `GET /test`
pub async fn test_endpoint() -> Json<MessageResponse> {
    Json(MessageResponse::ok())
}
