//! Anomaly daemon
//!
//! Serves the import anomaly store over REST:
//! - area-grouped overview and point lookup
//! - single and bulk resolution
//! - batch registration and deletion
//! - pending counters for import progress

use anomaly_daemon::config::StoreConfig;
use anomaly_daemon::error::{DaemonError, DaemonResult};
use anomaly_daemon::{DaemonConfig, Server};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Anomaly daemon CLI
#[derive(Parser)]
#[command(name = "anomalyd")]
#[command(about = "Import anomaly store service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ANOMALY_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "ANOMALY_LISTEN_ADDR")]
    listen: Option<String>,

    /// Redis URL; selects the Redis backend when set
    #[arg(long, env = "ANOMALY_REDIS_URL")]
    redis_url: Option<String>,

    /// Log level
    #[arg(long, env = "ANOMALY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ANOMALY_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    if let Some(url) = cli.redis_url {
        config.store = match config.store {
            StoreConfig::Redis {
                key_prefix,
                connect_timeout_ms,
                retries,
                ..
            } => StoreConfig::Redis {
                url,
                key_prefix,
                connect_timeout_ms,
                retries,
            },
            StoreConfig::Memory => StoreConfig::Redis {
                url,
                key_prefix: anomaly_store::redis::DEFAULT_KEY_PREFIX.to_string(),
                connect_timeout_ms: 500,
                retries: 1,
            },
        };
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "Starting anomaly daemon"
    );

    let server = Server::new(config).await?;
    server.run().await
}
