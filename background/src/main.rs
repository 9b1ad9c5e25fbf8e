use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_background::config::ConfigFile;
use wallet_background::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_background=info,wallet_keyring=info,poem=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    tracing::info!("Loading configuration from: {}", config_path);

    let config = ConfigFile::load(&config_path)?;
    config.validate()?;

    tracing::info!(
        "SS58 prefix {}, password cache {} min",
        config.keyring.ss58_format,
        config.signing.password_expiry_mins
    );

    server::run(config).await
}
