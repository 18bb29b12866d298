//! Daemon entry point for the SQL Server MCP server.
//!
//! Loads the database list, builds the gateway, and serves the relational
//! tool set over stdio until the client disconnects or a signal arrives.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dbmcp_core::{Gateway, GatewayConfig};
use dbmcp_mcp::{DaemonArgs, DaemonConfig, SqlServerMcp, init_tracing, serve_stdio};
use dbmcp_sqlserver::{SqlServerConfig, SqlServerConnector};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sqlserver-mcpd", version, about = "SQL Server MCP daemon.")]
struct CliArgs {
    #[command(flatten)]
    daemon: DaemonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sqlserver-mcpd: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = DaemonConfig::try_from(CliArgs::parse().daemon)?;
    init_tracing(config.debug);

    let databases = GatewayConfig::<SqlServerConfig>::load(&config.config_path)?;
    let gateway = Arc::new(Gateway::from_config(databases, SqlServerConnector));
    info!(
        config = %config.config_path.display(),
        databases = gateway.registry().len(),
        "sqlserver-mcpd starting"
    );

    serve_stdio(SqlServerMcp::new(gateway.clone()), gateway).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }
}
