//! HTTP servers.
//!
//! Two roles share this crate:
//! - the authorization server (`/authorize`, `/token`, JWKS and metadata)
//! - the resource server (`/profile`, behind the bearer-token guard)

pub mod resource;
pub mod transport;

use std::net::SocketAddr;

use axum::Router;

pub use transport::{AuthState, create_auth_router, create_resource_router};

/// Serve `router` on `addr` until CTRL+C.
///
/// # Errors
///
/// Returns error if the address cannot be bound or the server fails.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
