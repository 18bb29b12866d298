use std::fmt;
use std::str::FromStr;

use dbmcp_core::{BackendEntry, ConfigError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// API dialect a Cosmos DB account was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CosmosApi {
    #[default]
    Sql,
    Mongodb,
    Gremlin,
    Cassandra,
    Table,
}

impl CosmosApi {
    pub const NAMES: &'static [&'static str] = &["sql", "mongodb", "gremlin", "cassandra", "table"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Mongodb => "mongodb",
            Self::Gremlin => "gremlin",
            Self::Cassandra => "cassandra",
            Self::Table => "table",
        }
    }
}

impl fmt::Display for CosmosApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CosmosApi {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sql" => Ok(Self::Sql),
            "mongodb" => Ok(Self::Mongodb),
            "gremlin" => Ok(Self::Gremlin),
            "cassandra" => Ok(Self::Cassandra),
            "table" => Ok(Self::Table),
            other => Err(format!("unsupported Cosmos DB API type: {other}")),
        }
    }
}

/// Connection parameters for one Cosmos DB database.
#[derive(Clone, Deserialize)]
pub struct CosmosConfig {
    pub name: String,
    pub endpoint: String,
    pub key: String,
    pub database: String,
    #[serde(rename = "type", default, deserialize_with = "deserialize_api")]
    pub api: CosmosApi,
}

impl fmt::Debug for CosmosConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("database", &self.database)
            .field("api", &self.api)
            .finish()
    }
}

/// Falsy `type` values select the default dialect.
fn deserialize_api<'de, D>(deserializer: D) -> Result<CosmosApi, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) if !value.is_empty() => {
            value.parse().map_err(serde::de::Error::custom)
        }
        value if is_unset(&value) => Ok(CosmosApi::default()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported Cosmos DB API type: {other}"
        ))),
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        _ => false,
    }
}

impl BackendEntry for CosmosConfig {
    const REQUIRED_FIELDS: &'static [&'static str] = &["name", "endpoint", "key", "database"];

    fn name(&self) -> &str {
        &self.name
    }

    fn check_raw(index: usize, raw: &Map<String, Value>) -> Result<(), ConfigError> {
        let invalid = |value: String| ConfigError::InvalidDialect {
            index,
            value,
            allowed: CosmosApi::NAMES,
        };
        match raw.get("type") {
            None => Ok(()),
            Some(value) if is_unset(value) => Ok(()),
            Some(Value::String(value)) => value
                .parse::<CosmosApi>()
                .map(|_| ())
                .map_err(|_| invalid(value.clone())),
            Some(other) => Err(invalid(other.to_string())),
        }
    }
}
