use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl HttpServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serve until the token is cancelled; in-flight requests are allowed to finish.
pub async fn run_http_server(
    config: HttpServerConfig,
    router: Router,
    ctx: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", config.addr()))?;
    let local_addr: SocketAddr = listener.local_addr()?;

    info!(addr = %local_addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    Ok(())
}
