//! Azure Cosmos DB backend family for dbmcp.
//!
//! Talks to the Cosmos DB REST API with master-key authorization and exposes
//! the [`DocumentSession`] operation surface used by the document tools.

mod auth;
pub mod client;
pub mod config;
mod plan;
pub mod session;

pub use client::{CosmosClient, CosmosConnector, CosmosError};
pub use config::{CosmosApi, CosmosConfig};
pub use session::{ContainerSummary, DocumentSession};
