//! # dcbridge
//!
//! Mirrors the members of an IRC channel into a DC hub as synthetic users,
//! keeps the hub operator list in step with channel privileges, and relays
//! hub text back to IRC.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! dcbridge
//!
//! # Run with a specific config file
//! DCBRIDGE_CONFIG=/path/to/dcbridge.toml dcbridge
//!
//! # Run with environment variables
//! DCBRIDGE_IRC_SERVER=irc.example.net DCBRIDGE_CHANNEL='#hub' dcbridge
//! ```

mod config;
mod handlers;
mod metrics;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dcbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting dcbridge: {}:{} {} as {}",
        config.irc.server,
        config.irc.port,
        config.irc.chat_channel,
        config.irc.nickname
    );

    // Initialize metrics
    metrics::init_metrics();

    // Run until ctrl-c
    handlers::run_server(config).await?;

    Ok(())
}
