use anyhow::Result;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serve `router` on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c()))
        .await?;

    Ok(())
}

/// Resolve once `signal` fires. If the signal cannot be installed, never
/// resolve: the server keeps running instead of stopping at startup.
async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}
