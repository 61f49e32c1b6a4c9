//! HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::ServerConfig;
use crate::engine::PestEngine;
use crate::{Error, Result};

/// Identification HTTP service
pub struct Server {
    config: ServerConfig,
    engine: Arc<PestEngine>,
}

impl Server {
    /// Create a server around an already-built engine
    #[must_use]
    pub fn new(config: ServerConfig, engine: Arc<PestEngine>) -> Self {
        Self { config, engine }
    }

    /// Serve until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Fails if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.port,
        );

        let state = Arc::new(AppState {
            engine: Arc::clone(&self.engine),
            request_timeout: self.config.request_timeout,
        });
        let app = create_router(state, self.config.max_body_size);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("AGROPEST v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.host, port = %self.config.port, "Listening");
        info!(
            mode = self.engine.mode(),
            profiles = self.engine.knowledge_base().len(),
            "Engine ready"
        );
        if self.engine.mode() == "fuzzy" {
            warn!("Semantic matching unavailable - running fuzzy-only");
        }
        info!("  POST http://{}:{}/identify-pest", self.config.host, self.config.port);
        info!("  GET  http://{}:{}/pests", self.config.host, self.config.port);
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// resolves, leaving the other signal in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
