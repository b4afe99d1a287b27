//! Delivery providers.
//!
//! The send pipeline only sees [`DeliveryProvider`]. [`MockDelivery`] accepts
//! everything without sending; [`SesDelivery`] forwards to Amazon SES.

mod ses;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::validation::SendEmailRequest;

pub use ses::{SesCredentials, SesDelivery};

#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Short name reported in responses and logs.
    fn name(&self) -> &'static str;

    /// Deliver the message, returning the provider's message id.
    async fn deliver(&self, email: &SendEmailRequest) -> Result<String, DeliveryError>;
}

/// Accepts every message and sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockDelivery;

#[async_trait]
impl DeliveryProvider for MockDelivery {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn deliver(&self, email: &SendEmailRequest) -> Result<String, DeliveryError> {
        let message_id = Uuid::new_v4().to_string();
        tracing::debug!(
            message_id = %message_id,
            from = %email.from,
            recipients = email.to.len(),
            "Mock delivery accepted message"
        );
        Ok(message_id)
    }
}
