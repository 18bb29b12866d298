use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Fatal problems with the startup configuration document.
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    MissingDatabases,
    NoDatabases,
    MissingField { index: usize, field: &'static str },
    InvalidDialect { index: usize, value: String, allowed: &'static [&'static str] },
    InvalidEntry { index: usize, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read configuration file {}: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse configuration: {err}"),
            Self::MissingDatabases => {
                write!(f, "configuration must contain a \"databases\" array")
            }
            Self::NoDatabases => write!(f, "configuration must declare at least one database"),
            Self::MissingField { index, field } => {
                write!(f, "database at index {index}: required field \"{field}\" is missing")
            }
            Self::InvalidDialect {
                index,
                value,
                allowed,
            } => write!(
                f,
                "database at index {index}: type \"{value}\" is not valid (expected one of: {})",
                allowed.join(", ")
            ),
            Self::InvalidEntry { index, message } => {
                write!(f, "database at index {index}: {message}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// Errors raised while dispatching a tool invocation.
///
/// Every variant is rendered into the text envelope at the dispatch boundary;
/// none of them reaches the transport as a protocol error.
#[derive(Debug)]
pub enum GatewayError {
    UnknownBackend(String),
    UnknownTool(String),
    NoBackendsConfigured,
    NotAReadQuery { tool: &'static str, fallback: &'static str },
    InvalidArguments { tool: String, message: String },
    ShuttingDown,
    Disconnected(String),
    Backend(Box<dyn Error + Send + Sync>),
}

impl GatewayError {
    /// Wraps a driver failure as an opaque backend operation error.
    pub fn backend(err: impl Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBackend(name) => write!(f, "database '{name}' is not configured"),
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::NoBackendsConfigured => write!(f, "no databases are configured"),
            Self::NotAReadQuery { tool, fallback } => write!(
                f,
                "only SELECT queries are allowed with {tool}; use {fallback} for other commands"
            ),
            Self::InvalidArguments { tool, message } => {
                write!(f, "invalid arguments for {tool}: {message}")
            }
            Self::ShuttingDown => write!(f, "server is shutting down"),
            Self::Disconnected(name) => {
                write!(f, "connection to database '{name}' was closed while it was opening")
            }
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
