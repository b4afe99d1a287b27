use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, DeliveryMode};
use crate::delivery::{DeliveryProvider, MockDelivery, SesCredentials, SesDelivery};
use crate::error::ConfigError;
use crate::handlers::{send_email, stats, test_endpoint, AppState};
use crate::log_store::EmailLogStore;
use crate::mailer::Mailer;
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::quota::QuotaTracker;
use crate::rate_limiter::ClientRateLimiter;

/// Pick the delivery backend named in the configuration.
pub fn delivery_from_config(config: &Config) -> Result<Arc<dyn DeliveryProvider>, ConfigError> {
    match config.delivery_mode {
        DeliveryMode::Mock => Ok(Arc::new(MockDelivery)),
        DeliveryMode::Ses => {
            let credentials =
                SesCredentials::from_env().map_err(|e| ConfigError::Invalid(e.to_string()))?;
            let ses = SesDelivery::new(
                &config.aws_region,
                config.ses_endpoint.as_deref(),
                credentials,
            )
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Arc::new(ses))
        }
    }
}

pub fn build_state(
    config: &Config,
    clock: Arc<dyn Clock>,
    delivery: Arc<dyn DeliveryProvider>,
) -> AppState {
    let quota = QuotaTracker::new(config.hourly_limit, config.quota_window, clock.clone());
    let log = EmailLogStore::new(config.email_log_path.clone());
    let limiter = ClientRateLimiter::new(config.client_burst, config.client_refill_rate, clock);

    AppState::new(Mailer::new(quota, log, delivery), limiter)
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/send-email", post(send_email))
        .route("/stats", get(stats))
        .route("/test", get(test_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    addr: SocketAddr,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let delivery = delivery_from_config(&config)?;
        let state = build_state(&config, Arc::new(SystemClock::new()), delivery);

        Ok(Self {
            app: create_app(state),
            addr: config.bind_addr(),
        })
    }

    pub async fn run(self) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        tracing::info!("Mock SES server listening on {}", listener.local_addr()?);
        tracing::info!("Send endpoint available at POST /send-email");
        tracing::info!("Usage statistics available at GET /stats");

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
