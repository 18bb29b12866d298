//! Startup configuration document.
//!
//! The document is a JSON object with a `databases` array and an optional
//! `defaultDatabase` name. Each family decides which fields its entries
//! require through [`BackendEntry`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

const DATABASES_KEY: &str = "databases";
const DEFAULT_DATABASE_KEY: &str = "defaultDatabase";

/// One entry of the `databases` array for a backend family.
pub trait BackendEntry: DeserializeOwned {
    /// Fields that must be present and non-empty.
    const REQUIRED_FIELDS: &'static [&'static str];

    /// Unique backend name.
    fn name(&self) -> &str;

    /// Family-specific checks on the raw entry, run after the required-field
    /// check and before deserialization.
    ///
    /// # Errors
    /// Returns `ConfigError` describing the offending field.
    fn check_raw(_index: usize, _raw: &Map<String, Value>) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Validated configuration: at least one entry, plus the requested default.
#[derive(Debug, Clone)]
pub struct GatewayConfig<E> {
    pub entries: Vec<E>,
    pub default_backend: Option<String>,
}

impl<E: BackendEntry> GatewayConfig<E> {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is unreadable or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&raw)?;
        debug!(
            path = %path.display(),
            count = config.entries.len(),
            "loaded database configuration"
        );
        Ok(config)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    /// Returns `ConfigError` if the text is not JSON or fails validation.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Validates an already parsed configuration document.
    ///
    /// # Errors
    /// Returns `ConfigError` for the first structural violation found.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut document) = value else {
            return Err(ConfigError::MissingDatabases);
        };
        let Some(Value::Array(raw_entries)) = document.remove(DATABASES_KEY) else {
            return Err(ConfigError::MissingDatabases);
        };
        if raw_entries.is_empty() {
            return Err(ConfigError::NoDatabases);
        }

        for (index, raw) in raw_entries.iter().enumerate() {
            let Value::Object(fields) = raw else {
                return Err(ConfigError::InvalidEntry {
                    index,
                    message: "entry must be an object".to_string(),
                });
            };
            if let Some(field) = E::REQUIRED_FIELDS
                .iter()
                .find(|field| !is_present(fields.get(**field)))
            {
                return Err(ConfigError::MissingField {
                    index,
                    field: *field,
                });
            }
            E::check_raw(index, fields)?;
        }

        let entries = raw_entries
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                serde_json::from_value(raw).map_err(|err| ConfigError::InvalidEntry {
                    index,
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<E>, _>>()?;

        let default_backend = document
            .get(DEFAULT_DATABASE_KEY)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(Self {
            entries,
            default_backend,
        })
    }
}

/// A field counts as present when it holds a truthy JSON value.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(_) => true,
    }
}
