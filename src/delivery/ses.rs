//! Amazon SES v2 `SendEmail` over plain HTTPS, signed with AWS Signature V4.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::SystemTime;
use tracing::{info, warn};

use super::DeliveryProvider;
use crate::error::DeliveryError;
use crate::validation::SendEmailRequest;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "ses";
const SEND_EMAIL_PATH: &str = "/v2/email/outbound-emails";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Clone)]
pub struct SesCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl SesCredentials {
    /// Read the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` /
    /// `AWS_SESSION_TOKEN` variables.
    pub fn from_env() -> Result<Self, DeliveryError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| DeliveryError::Credentials("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            DeliveryError::Credentials("AWS_SECRET_ACCESS_KEY is not set".to_string())
        })?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

impl std::fmt::Debug for SesCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SesCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SendEmailOutput {
    #[serde(rename = "MessageId")]
    message_id: String,
}

#[derive(Debug)]
pub struct SesDelivery {
    client: reqwest::Client,
    url: Url,
    region: String,
    credentials: SesCredentials,
}

impl SesDelivery {
    /// `endpoint` overrides the regional `https://email.<region>.amazonaws.com`.
    pub fn new(
        region: &str,
        endpoint: Option<&str>,
        credentials: SesCredentials,
    ) -> Result<Self, DeliveryError> {
        let base = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://email.{}.amazonaws.com", region));
        let url = Url::parse(&base)
            .and_then(|base| base.join(SEND_EMAIL_PATH))
            .map_err(|e| DeliveryError::Endpoint(format!("{}: {}", base, e)))?;

        if url.host_str().is_none() {
            return Err(DeliveryError::Endpoint(format!("{} has no host", base)));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            region: region.to_string(),
            credentials,
        })
    }

    fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Headers to attach so that SES accepts `payload` as sent at `now`.
    fn signed_headers(
        &self,
        payload: &[u8],
        now: SystemTime,
    ) -> Result<Vec<(&'static str, String)>, DeliveryError> {
        let amz_date = amz_date(now);
        let date = &amz_date[..8];
        let host = self.host_header();

        let mut headers = vec![
            ("content-type", "application/json".to_string()),
            ("host", host),
            ("x-amz-date", amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_names = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "POST\n{}\n\n{}\n{}\n{}",
            self.url.path(),
            canonical_headers,
            signed_names,
            hex::encode(Sha256::digest(payload))
        );

        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = signing_key(&self.credentials.secret_access_key, date, &self.region, SERVICE)?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        headers.retain(|(name, _)| *name != "host");
        headers.push((
            "authorization",
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.credentials.access_key_id, scope, signed_names, signature
            ),
        ));
        Ok(headers)
    }
}

#[async_trait]
impl DeliveryProvider for SesDelivery {
    fn name(&self) -> &'static str {
        "AWS SES"
    }

    async fn deliver(&self, email: &SendEmailRequest) -> Result<String, DeliveryError> {
        let payload = serde_json::to_vec(&json!({
            "FromEmailAddress": email.from,
            "Destination": { "ToAddresses": email.to },
            "Content": {
                "Simple": {
                    "Subject": { "Data": email.subject, "Charset": "UTF-8" },
                    "Body": { "Text": { "Data": email.body, "Charset": "UTF-8" } }
                }
            }
        }))
        .map_err(|e| DeliveryError::Signing(e.to_string()))?;

        let mut request = self.client.post(self.url.clone());
        for (name, value) in self.signed_headers(&payload, SystemTime::now())? {
            request = request.header(name, value);
        }

        let response = request.body(payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "SES rejected message");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let output: SendEmailOutput = response.json().await?;
        info!(message_id = %output.message_id, "SES accepted message");
        Ok(output.message_id)
    }
}

/// `YYYYMMDD'T'HHMMSS'Z'` in UTC.
fn amz_date(now: SystemTime) -> String {
    humantime::format_rfc3339_seconds(now)
        .to_string()
        .chars()
        .filter(|c| *c != '-' && *c != ':')
        .collect()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DeliveryError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| DeliveryError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, DeliveryError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}
