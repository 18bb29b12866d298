//! Daemon entry point for the Azure Cosmos DB MCP server.
//!
//! Loads the account list, builds the gateway, and serves the document tool
//! set over stdio until the client disconnects or a signal arrives.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dbmcp_core::{Gateway, GatewayConfig};
use dbmcp_cosmos::{CosmosConfig, CosmosConnector};
use dbmcp_mcp::{CosmosMcp, DaemonArgs, DaemonConfig, init_tracing, serve_stdio};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cosmosdb-mcpd", version, about = "Azure Cosmos DB MCP daemon.")]
struct CliArgs {
    #[command(flatten)]
    daemon: DaemonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("cosmosdb-mcpd: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = DaemonConfig::try_from(CliArgs::parse().daemon)?;
    init_tracing(config.debug);

    let databases = GatewayConfig::<CosmosConfig>::load(&config.config_path)?;
    for entry in &databases.entries {
        info!(database = %entry.name, api = %entry.api, "configured Cosmos DB database");
    }
    let gateway = Arc::new(Gateway::from_config(databases, CosmosConnector));

    serve_stdio(CosmosMcp::new(gateway.clone()), gateway).await
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
