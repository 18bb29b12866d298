//! Uniform text payload returned for every tool invocation.
//!
//! Successes are pretty-printed JSON; failures become `Error: <message>`.
//! Both travel as ordinary tool output, never as transport errors.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::GatewayError;

const ERROR_PREFIX: &str = "Error: ";

/// Renders a handler outcome into the envelope text.
pub fn render<T: Serialize>(outcome: Result<T, GatewayError>) -> String {
    match outcome {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|err| error_text(&format!("failed to serialize result: {err}"))),
        Err(err) => error_text(&err.to_string()),
    }
}

#[must_use]
pub fn error_text(message: &str) -> String {
    format!("{ERROR_PREFIX}{message}")
}

/// Returns true when `text` is an error envelope.
#[must_use]
pub fn is_error(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX)
}

/// Deserializes a tool's argument bundle into its parameter struct.
///
/// # Errors
/// Returns `GatewayError::InvalidArguments` naming the tool when a required
/// argument is missing or mistyped.
pub fn parse_args<T: DeserializeOwned>(
    tool: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<T, GatewayError> {
    let arguments = Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(arguments).map_err(|err| GatewayError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct QueryArgs {
        query: String,
        database: Option<String>,
    }

    #[test]
    fn success_is_pretty_json() {
        let text = render(Ok(json!({"database": "A", "rowCount": 0})));
        assert_eq!(text, "{\n  \"database\": \"A\",\n  \"rowCount\": 0\n}");
        assert!(!is_error(&text));
    }

    #[test]
    fn failure_is_prefixed_text() {
        let text = render::<Value>(Err(GatewayError::UnknownTool("drop_everything".into())));
        assert_eq!(text, "Error: unknown tool: drop_everything");
        assert!(is_error(&text));
    }

    #[test]
    fn parse_args_reads_optional_fields() {
        let args = json!({"query": "SELECT 1"}).as_object().cloned();
        let parsed: QueryArgs = parse_args("sql_query", args).unwrap();
        assert_eq!(parsed.query, "SELECT 1");
        assert!(parsed.database.is_none());
    }

    #[test]
    fn parse_args_reports_missing_required_field() {
        let err = parse_args::<QueryArgs>("sql_query", None).unwrap_err();
        let text = render::<Value>(Err(err));
        assert!(text.starts_with("Error: invalid arguments for sql_query"));
        assert!(text.contains("query"));
    }
}
