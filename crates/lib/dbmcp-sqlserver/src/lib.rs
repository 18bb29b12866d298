//! SQL Server backend family for dbmcp.
//!
//! Provides the relational connection config, a `tiberius` based connector,
//! and the [`SqlSession`] operation surface used by the SQL tools.

pub mod client;
pub mod config;
pub mod session;
mod values;

pub use client::{SqlServerClient, SqlServerConnector, SqlServerError};
pub use config::{SqlServerConfig, SqlServerOptions};
pub use session::{ExecuteSummary, JsonRow, SqlSession, is_read_query};
