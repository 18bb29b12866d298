//! MCP tool dispatchers for dbmcp.
//!
//! Each backend family gets one rmcp [`ServerHandler`](rmcp::ServerHandler):
//! [`SqlServerMcp`] for the relational tool set and [`CosmosMcp`] for the
//! document tool set. Every invocation, successful or not, is answered with a
//! single text envelope produced by [`dbmcp_core::envelope`].

pub mod server;
pub mod settings;
mod tools;

pub use server::{init_tracing, serve_stdio};
pub use settings::{DaemonArgs, DaemonConfig, SettingsError};
pub use tools::cosmos::CosmosMcp;
pub use tools::sqlserver::SqlServerMcp;
