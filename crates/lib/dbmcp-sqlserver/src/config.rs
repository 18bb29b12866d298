use std::fmt;

use dbmcp_core::BackendEntry;
use serde::Deserialize;

/// Connection parameters for one SQL Server database.
#[derive(Clone, Deserialize)]
pub struct SqlServerConfig {
    pub name: String,
    pub user: String,
    pub password: String,
    pub server: String,
    pub database: String,
    pub port: u16,
    #[serde(default)]
    pub options: SqlServerOptions,
}

/// Transport options; defaults match a local, self-signed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SqlServerOptions {
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl Default for SqlServerOptions {
    fn default() -> Self {
        Self {
            encrypt: false,
            trust_server_certificate: true,
        }
    }
}

impl fmt::Debug for SqlServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerConfig")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("options", &self.options)
            .finish()
    }
}

impl BackendEntry for SqlServerConfig {
    const REQUIRED_FIELDS: &'static [&'static str] =
        &["name", "user", "password", "server", "database", "port"];

    fn name(&self) -> &str {
        &self.name
    }
}
