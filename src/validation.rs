use crate::error::ApiError;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use validator::Validate;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Purely syntactic `local-part@domain.tld` check. No DNS lookups.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

/// Body of `POST /send-email`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendEmailRequest {
    pub from: String,
    #[validate(length(min = 1, message = "At least one recipient is required."))]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Checks payload shape, then the sender, then each recipient in order.
    /// The first failure wins.
    pub fn validate_send_request(request: &SendEmailRequest) -> Result<(), ApiError> {
        request
            .validate()
            .map_err(|e| ApiError::InvalidParameterValue(e.to_string()))?;

        if !is_valid_email(&request.from) {
            return Err(ApiError::InvalidParameterValue(
                "Invalid sender email format.".to_string(),
            ));
        }

        if let Some(bad) = request.to.iter().find(|r| !is_valid_email(r)) {
            return Err(ApiError::InvalidParameterValue(format!(
                "Invalid recipient email format: {}",
                bad
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(from: &str, to: &[&str]) -> SendEmailRequest {
        SendEmailRequest {
            from: from.to_string(),
            to: to.iter().map(|s| s.to_string()).collect(),
            subject: "Hello".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_accepts_well_formed_addresses() {
        for addr in [
            "user@example.com",
            "first.last+tag@mail.example.co",
            "a_b%c-d@sub-domain.example.org",
            "x@y.io",
        ] {
            assert!(is_valid_email(addr), "{addr} should be valid");
        }
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for addr in [
            "",
            "no-at-sign.example.com",
            "@example.com",
            "user@example.c",
            "user@example",
            "user@example.c0m",
            "user name@example.com",
            "user@exa mple.com",
        ] {
            assert!(!is_valid_email(addr), "{addr:?} should be invalid");
        }
    }

    #[test]
    fn test_sender_checked_before_recipients() {
        let err = RequestValidator::validate_send_request(&request("bad", &["also-bad"])).unwrap_err();
        assert!(err.to_string().contains("sender"));
    }

    #[test]
    fn test_first_bad_recipient_reported() {
        let err = RequestValidator::validate_send_request(&request(
            "me@example.com",
            &["ok@example.com", "broken@", "worse"],
        ))
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidParameterValue(_)));
        assert!(err.to_string().contains("broken@"));
    }

    #[test]
    fn test_empty_recipient_list_rejected() {
        let err = RequestValidator::validate_send_request(&request("me@example.com", &[])).unwrap_err();
        assert!(matches!(err, ApiError::InvalidParameterValue(_)));
    }

    #[test]
    fn test_subject_and_body_default_to_empty() {
        let req: SendEmailRequest =
            serde_json::from_str(r#"{"from":"me@example.com","to":["you@example.com"]}"#).unwrap();
        assert!(req.subject.is_empty());
        assert!(req.body.is_empty());
        assert!(RequestValidator::validate_send_request(&req).is_ok());
    }
}
