pub mod cosmos;
pub mod sqlserver;

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject};
use rmcp::schemars::{self, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// Parameters for tools that only pick a target backend.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct TargetParams {
    /// Configured database name; the default database is used when omitted.
    pub database: Option<String>,
}

/// Tools without arguments.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct NoParams {}

/// Input schema for a parameter struct, as advertised by `tools/list`.
pub(crate) fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let mut schema = match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(map)) => map,
        _ => JsonObject::new(),
    };
    schema.remove("$schema");
    schema
        .entry("type")
        .or_insert_with(|| Value::String("object".to_string()));
    Arc::new(schema)
}

/// Wraps envelope text as tool output; failures travel the same way.
pub(crate) fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_optional_database() {
        let schema = input_schema::<TargetParams>();
        assert_eq!(schema.get("type"), Some(&Value::String("object".to_string())));
        assert!(schema["properties"].get("database").is_some());
        assert!(
            schema
                .get("required")
                .and_then(Value::as_array)
                .is_none_or(Vec::is_empty)
        );
    }

    #[test]
    fn empty_params_still_describe_an_object() {
        let schema = input_schema::<NoParams>();
        assert_eq!(schema.get("type"), Some(&Value::String("object".to_string())));
        assert!(!schema.contains_key("$schema"));
    }
}
