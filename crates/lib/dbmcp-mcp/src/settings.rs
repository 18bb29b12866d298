//! Command-line and environment settings shared by the dbmcp daemons.

use clap::{Args, builder::BoolishValueParser};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "databases.config.json";

/// Flags every daemon accepts; flatten into the binary's `Parser`.
#[derive(Args, Debug, Clone, Default)]
pub struct DaemonArgs {
    /// Path to the databases configuration file. Defaults to
    /// `databases.config.json` next to the executable.
    #[arg(long = "config", env = "DBMCP_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Write diagnostics to stderr.
    #[arg(
        long,
        env = "DEBUG_MCP",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    pub debug: bool,
}

/// Runtime settings resolved from [`DaemonArgs`].
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub config_path: PathBuf,
    pub debug: bool,
}

#[derive(Debug)]
pub enum SettingsError {
    ExecutableDir(std::io::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutableDir(err) => {
                write!(f, "cannot locate the executable directory for {DEFAULT_CONFIG_FILE}: {err}")
            }
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ExecutableDir(err) => Some(err),
        }
    }
}

impl TryFrom<DaemonArgs> for DaemonConfig {
    type Error = SettingsError;

    fn try_from(args: DaemonArgs) -> Result<Self, Self::Error> {
        let config_path = match args
            .config_path
            .filter(|path| !path.as_os_str().is_empty())
        {
            Some(path) => path,
            None => default_config_path()?,
        };
        Ok(Self {
            config_path,
            debug: args.debug,
        })
    }
}

fn default_config_path() -> Result<PathBuf, SettingsError> {
    let exe = std::env::current_exe().map_err(SettingsError::ExecutableDir)?;
    let dir = exe.parent().ok_or_else(|| {
        SettingsError::ExecutableDir(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "executable has no parent directory",
        ))
    })?;
    Ok(dir.join(DEFAULT_CONFIG_FILE))
}
