//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StoreConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::sweeper::Sweeper;
use anomaly_store::redis::{RedisAnomalyStore, RedisOptions};
use anomaly_store::{AnomalyStore, InMemoryAnomalyStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the configured store backend.
pub async fn build_store(config: &DaemonConfig) -> DaemonResult<Arc<dyn AnomalyStore>> {
    let settings = config.anomaly.store_settings();

    let store: Arc<dyn AnomalyStore> = match &config.store {
        StoreConfig::Memory => Arc::new(InMemoryAnomalyStore::with_settings(settings)),
        StoreConfig::Redis {
            url,
            key_prefix,
            connect_timeout_ms,
            retries,
        } => {
            let options = RedisOptions {
                key_prefix: key_prefix.clone(),
                connect_timeout: Duration::from_millis(*connect_timeout_ms),
                retries: *retries,
            };
            Arc::new(RedisAnomalyStore::connect(url, settings, options).await?)
        }
    };

    tracing::info!(
        backend = store.backend_name(),
        ttl_ms = config.anomaly.ttl_ms,
        "Anomaly store ready"
    );
    Ok(store)
}

/// Anomaly daemon server
pub struct Server {
    config: DaemonConfig,
    store: Arc<dyn AnomalyStore>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store = build_store(&config).await?;
        Ok(Self { config, store })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.store.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Anomaly daemon listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = self.config.anomaly.sweep_interval().map(|every| {
            tokio::spawn(Sweeper::new(self.store.clone(), every).run(shutdown_rx))
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Anomaly daemon shutting down");

        let _ = shutdown_tx.send(true);
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
