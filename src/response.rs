use serde::Serialize;

use crate::mailer::SendReceipt;
use crate::quota::QuotaStatus;

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub message: String,
    pub emails_sent: u32,
    pub message_id: String,
}

impl SendEmailResponse {
    pub fn accepted(receipt: SendReceipt) -> Self {
        let message = if receipt.provider == "mock" {
            "Email sent successfully (mock)".to_string()
        } else {
            format!("Email sent successfully via {}", receipt.provider)
        };

        Self {
            message,
            emails_sent: receipt.emails_sent,
            message_id: receipt.message_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_emails_sent: u64,
    pub emails_sent_last_hour: u32,
    pub time_elapsed_since_reset: String,
    pub remaining_emails_before_limit: u32,
    pub limit_reached: bool,
}

impl From<QuotaStatus> for StatsResponse {
    fn from(status: QuotaStatus) -> Self {
        let hours = status.elapsed.as_secs_f64() / 3600.0;

        Self {
            total_emails_sent: status.total_sent,
            emails_sent_last_hour: status.effective_count(),
            time_elapsed_since_reset: format!("{:.2} hours", hours),
            remaining_emails_before_limit: status.remaining(),
            limit_reached: status.limit_reached(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn ok() -> Self {
        Self {
            message: "Request successful",
        }
    }
}
