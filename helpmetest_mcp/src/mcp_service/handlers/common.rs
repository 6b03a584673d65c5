use rmcp::model::{CallToolResult, Content, ErrorData as McpError};
use serde_json::{Map, Value, json};

/// Schema for the optional `wait` argument, in milliseconds.
pub fn wait_property(default_ms: u128) -> Value {
    json!({
        "type": "integer",
        "minimum": 0,
        "default": default_ms as u64,
        "description": format!("Maximum time to wait in milliseconds (default {default_ms})")
    })
}

/// Object schema with the given properties and required names.
pub fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema
}

/// Parses `wait` as a non-negative number of milliseconds.
///
/// Accepts integers, floats and numeric strings; absent or null means default.
pub fn parse_wait_ms(args: &Map<String, Value>) -> Result<Option<u64>, McpError> {
    let invalid = |detail: &str| {
        McpError::invalid_params(
            format!("'wait' must be a non-negative number of milliseconds, got {detail}"),
            None,
        )
    };
    match args.get("wait") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(ms) = n.as_u64() {
                Ok(Some(ms))
            } else {
                match n.as_f64() {
                    Some(ms) if ms >= 0.0 && ms.is_finite() => Ok(Some(ms as u64)),
                    _ => Err(invalid(&n.to_string())),
                }
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(&format!("{s:?}"))),
        Some(other) => Err(invalid(&other.to_string())),
    }
}

/// A trimmed, non-empty string argument.
pub fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

pub fn json_result(value: Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(value.to_string())])
}

/// Tool-level failure, reported to the caller as `is_error`.
pub fn error_result(value: Value) -> CallToolResult {
    CallToolResult::error(vec![Content::text(value.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn wait_accepts_numbers_and_strings() {
        assert_eq!(parse_wait_ms(&args(json!({}))).unwrap(), None);
        assert_eq!(parse_wait_ms(&args(json!({"wait": null}))).unwrap(), None);
        assert_eq!(parse_wait_ms(&args(json!({"wait": 200}))).unwrap(), Some(200));
        assert_eq!(parse_wait_ms(&args(json!({"wait": 250.7}))).unwrap(), Some(250));
        assert_eq!(parse_wait_ms(&args(json!({"wait": "1000"}))).unwrap(), Some(1000));
    }

    #[test]
    fn wait_rejects_negative_and_garbage() {
        assert!(parse_wait_ms(&args(json!({"wait": -5}))).is_err());
        assert!(parse_wait_ms(&args(json!({"wait": "soon"}))).is_err());
        assert!(parse_wait_ms(&args(json!({"wait": [1]}))).is_err());
    }

    #[test]
    fn blank_strings_are_absent() {
        let a = args(json!({"room": "  ", "message": " hi "}));
        assert_eq!(optional_str(&a, "room"), None);
        assert_eq!(optional_str(&a, "message"), Some("hi"));
        assert_eq!(optional_str(&a, "tasks"), None);
    }
}
