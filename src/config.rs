use clap::{Parser, ValueEnum};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Where accepted messages go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeliveryMode {
    /// Accept and log only
    Mock,
    /// Forward to Amazon SES
    Ses,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mock-ses", version, about = "Mock email-sending API with quota and throttling")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum accepted sends per quota window
    #[arg(long, env = "HOURLY_SEND_LIMIT", default_value_t = 5)]
    pub hourly_limit: u32,

    /// Length of the quota window (e.g. "1h", "90m")
    #[arg(long, env = "QUOTA_WINDOW", default_value = "1h", value_parser = humantime::parse_duration)]
    pub quota_window: Duration,

    /// Per-client token bucket capacity
    #[arg(long, env = "CLIENT_BURST", default_value_t = 5)]
    pub client_burst: u32,

    /// Per-client refill rate in requests per second
    #[arg(long, env = "CLIENT_REFILL_RATE", default_value_t = 5.0)]
    pub client_refill_rate: f64,

    /// JSON file holding the log of accepted sends
    #[arg(long = "email-log", env = "EMAIL_LOG_PATH", default_value = "email_logs.json")]
    pub email_log_path: PathBuf,

    /// Delivery backend
    #[arg(long = "delivery", env = "DELIVERY_MODE", value_enum, default_value_t = DeliveryMode::Mock)]
    pub delivery_mode: DeliveryMode,

    /// AWS region used in SES mode
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub aws_region: String,

    /// Override the SES endpoint (e.g. a local emulator)
    #[arg(long, env = "SES_ENDPOINT")]
    pub ses_endpoint: Option<String>,

    /// Default log level for this crate
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            hourly_limit: 5,
            quota_window: Duration::from_secs(3600),
            client_burst: 5,
            client_refill_rate: 5.0,
            email_log_path: PathBuf::from("email_logs.json"),
            delivery_mode: DeliveryMode::Mock,
            aws_region: "us-east-1".to_string(),
            ses_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from command-line flags and the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("Server port must be greater than 0".to_string()));
        }

        if self.hourly_limit == 0 {
            return Err(ConfigError::Invalid("Hourly send limit must be greater than 0".to_string()));
        }

        if self.quota_window.is_zero() {
            return Err(ConfigError::Invalid("Quota window must be greater than 0".to_string()));
        }

        if self.client_burst == 0 {
            return Err(ConfigError::Invalid(
                "Client bucket capacity must be greater than 0".to_string(),
            ));
        }

        if !self.client_refill_rate.is_finite() || self.client_refill_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "Client refill rate must be a positive number".to_string(),
            ));
        }

        if self.email_log_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("Email log path cannot be empty".to_string()));
        }

        if self.delivery_mode == DeliveryMode::Ses && self.aws_region.trim().is_empty() {
            return Err(ConfigError::Invalid("AWS region cannot be empty in SES mode".to_string()));
        }

        Ok(())
    }
}
