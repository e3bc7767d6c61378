//! HTTP server lifecycle.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::{routes::create_router, state::AppState};

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be parsed or bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// The gateway HTTP server
#[derive(Debug)]
pub struct Server {
    addr: String,
    state: AppState,
}

impl Server {
    /// Create a server listening on the configured host and port
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            addr: state.config.server.listen_addr(),
            state,
        }
    }

    /// Override the listen address
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Listen address
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests for at
    /// most the configured shutdown timeout
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr.clone(),
                source,
            })?;
        let local_addr: Option<SocketAddr> = listener.local_addr().ok();

        info!(
            addr = ?local_addr,
            auth = self.state.config.server.auth_token().is_some(),
            "Starting HTTP server"
        );

        let grace = self.state.config.server.shutdown_timeout;
        let (fired_tx, fired_rx) = oneshot::channel::<()>();
        let signal = async move {
            shutdown.await;
            let _ = fired_tx.send(());
        };

        let app = create_router(self.state);
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .into_future();

        // Bound the drain so long-lived streams cannot hold shutdown forever
        let deadline = async move {
            if fired_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = serve => result?,
            () = deadline => {
                warn!(timeout = ?grace, "Graceful shutdown timed out; closing open connections");
            }
        }

        info!("Server shut down");
        Ok(())
    }
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// ignored.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(signal = "ctrl+c", "Shutdown signal received"),
        () = terminate => info!(signal = "sigterm", "Shutdown signal received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_agents::AgentRegistry;
    use gateway_providers::MockProvider;
    use gateway_routing::Router;
    use std::sync::Arc;

    fn server() -> Server {
        let router = Router::builder(Arc::new(AgentRegistry::new()))
            .provider(Arc::new(MockProvider::default()))
            .build()
            .unwrap();
        let state = AppState::builder().router(Arc::new(router)).build().unwrap();
        Server::new(state)
    }

    #[test]
    fn test_default_addr() {
        assert_eq!(server().addr(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_run_until_returns_after_shutdown() {
        let result = server()
            .with_addr("127.0.0.1:0")
            .run_until(async {})
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let err = server()
            .with_addr("not-an-address")
            .run_until(async {})
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
