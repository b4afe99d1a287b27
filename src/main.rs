use anyhow::Result;
use mock_ses::config::Config;
use mock_ses::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mock_ses={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mock SES service");
    tracing::info!(
        "Configuration: bind_address={}, hourly_limit={}, quota_window={}, client_burst={}, client_refill_rate={}, delivery={:?}, email_log={}",
        config.bind_addr(),
        config.hourly_limit,
        humantime::format_duration(config.quota_window),
        config.client_burst,
        config.client_refill_rate,
        config.delivery_mode,
        config.email_log_path.display()
    );

    let server = Server::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
