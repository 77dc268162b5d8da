//! Web server for chatrelay.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::chat::ChatRouter;
use crate::config::{AuthConfig, ServerConfig};
use crate::{RelayError, Result};

use super::router::create_app;
use super::ws::ChatWsState;

/// Web server hosting the chat gateway.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Gateway state.
    state: Arc<ChatWsState>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &ServerConfig, auth: &AuthConfig, router: Arc<ChatRouter>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                RelayError::Config(format!(
                    "invalid server address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;
        let state = Arc::new(ChatWsState::new(router, &auth.user_header)?);

        Ok(Self { addr, state })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the web server.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Chat relay listening on http://{}", local_addr);

        axum::serve(listener, create_app(self.state)).await?;
        Ok(())
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let app = create_app(self.state);

        tracing::info!("Chat relay listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
