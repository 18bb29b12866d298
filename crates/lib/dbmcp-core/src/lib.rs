//! Core types and services for dbmcp.
//!
//! This crate owns the backend registry and the lazily populated connection
//! cache shared by every backend family, together with configuration loading,
//! the gateway error taxonomy, and the text envelope returned for each tool
//! invocation.

pub mod backend;
pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod registry;

pub use backend::Connector;
pub use cache::{ConnectionCache, DisconnectSummary};
pub use config::{BackendEntry, GatewayConfig};
pub use error::{ConfigError, GatewayError};
pub use gateway::{BackendInventory, Gateway};
pub use registry::BackendRegistry;
