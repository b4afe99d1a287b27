use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::rate_limiter::ClientDecision;

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_identity(&request);

    info!(
        target: "mock_ses::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "mock_ses::middleware",
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    response
}

/// Per-client token bucket gate, applied to every route ahead of the handler.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = client_identity(&request);

    match state.limiter.try_consume(&client_ip) {
        Ok(ClientDecision::Allowed { remaining }) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(state.limiter.capacity()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Ok(ClientDecision::Throttled { retry_after }) => {
            warn!(
                target: "mock_ses::middleware",
                client_ip = %client_ip,
                retry_after_ms = retry_after.as_millis() as u64,
                "Client rate limit exceeded"
            );
            ApiError::throttled("Too many requests. Please try again later.", retry_after)
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Identity used for per-client limiting: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the peer address.
pub fn client_identity(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.trim().to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}
