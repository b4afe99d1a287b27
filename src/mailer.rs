use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

use crate::delivery::DeliveryProvider;
use crate::error::ApiError;
use crate::log_store::{EmailLogStore, LogRecord};
use crate::quota::{QuotaStatus, QuotaTracker};
use crate::validation::{RequestValidator, SendEmailRequest};

/// Result of an accepted send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    /// Window count after this send was committed.
    pub emails_sent: u32,
    pub message_id: String,
    pub provider: &'static str,
}

/// The send pipeline: validate, admit against the quota, deliver, log, commit.
pub struct Mailer {
    quota: QuotaTracker,
    log: EmailLogStore,
    delivery: Arc<dyn DeliveryProvider>,
}

impl Mailer {
    pub fn new(quota: QuotaTracker, log: EmailLogStore, delivery: Arc<dyn DeliveryProvider>) -> Self {
        Self {
            quota,
            log,
            delivery,
        }
    }

    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.status()
    }

    pub fn log_store(&self) -> &EmailLogStore {
        &self.log
    }

    /// Quota is only committed once the record is in the log. Any earlier
    /// failure drops the admission and leaves the count untouched.
    pub async fn send(&self, request: SendEmailRequest) -> Result<SendReceipt, ApiError> {
        RequestValidator::validate_send_request(&request)?;

        let admission = self.quota.try_admit().map_err(|exceeded| {
            warn!(
                limit = self.quota.limit(),
                retry_after_secs = exceeded.retry_after.as_secs(),
                "Send quota exhausted"
            );
            ApiError::throttled("Email limit exceeded. Try again later.", exceeded.retry_after)
        })?;

        let provider = self.delivery.name();
        let message_id = self.delivery.deliver(&request).await.map_err(|e| {
            error!(provider, error = %e, "Delivery failed");
            ApiError::MessageRejected(format!("Failed to send email via {}.", provider))
        })?;

        let recipients = request.to.len();
        let emails_sent = self
            .log
            .append_with(
                move || LogRecord::accepted(request, SystemTime::now()),
                move || admission.commit(),
            )
            .await
            .map_err(|e| {
                error!(path = %self.log.path().display(), error = %e, "Failed to persist email log");
                ApiError::InternalError("Failed to save email log.".to_string())
            })?;

        info!(
            provider,
            message_id = %message_id,
            recipients,
            emails_sent,
            "Email accepted"
        );

        Ok(SendReceipt {
            emails_sent,
            message_id,
            provider,
        })
    }
}
