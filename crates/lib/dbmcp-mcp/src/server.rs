//! Stdio runner and diagnostics setup shared by the dbmcp daemons.

use std::error::Error;
use std::sync::Arc;

use dbmcp_core::{Connector, Gateway};
use rmcp::transport::io::stdio;
use rmcp::{ServerHandler, serve_server};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_DEBUG_FILTER: &str = "info,dbmcp_core=debug,dbmcp_mcp=debug,dbmcp_sqlserver=debug,dbmcp_cosmos=debug,sqlserver_mcpd=debug,cosmosdb_mcpd=debug";

/// Serves `service` over stdio until the client disconnects or the process
/// receives SIGINT/SIGTERM, then closes every cached connection.
///
/// # Errors
/// Returns transport initialization or join errors.
pub async fn serve_stdio<S, K>(
    service: S,
    gateway: Arc<Gateway<K>>,
) -> Result<(), Box<dyn Error + Send + Sync>>
where
    S: ServerHandler,
    K: Connector,
{
    let running = serve_server(service, stdio()).await?;
    let token = running.cancellation_token();
    let watcher = tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => {
                info!(signal, "shutdown signal received");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "failed to listen for shutdown signals"),
        }
    });

    let reason = running.waiting().await;
    watcher.abort();
    gateway.shutdown().await;
    info!(reason = ?reason, "server stopped");
    reason?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "SIGINT")
}

/// Installs a stderr `fmt` subscriber when `debug` is set.
///
/// `RUST_LOG` overrides the default filter. Without `debug` nothing is
/// installed and the process stays silent; stdout is reserved for the
/// protocol either way.
pub fn init_tracing(debug: bool) {
    if !debug {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DEBUG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
