//! Output formatting for CLI commands

use serde::Serialize;

/// Format output as pretty JSON or as `key: value` lines based on --json flag
pub fn format_output<T: Serialize>(data: &T, json: bool) -> String {
    let value = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
    if json {
        return serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
    }

    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, v)| match v {
                serde_json::Value::Null => format!("{}: -", key),
                serde_json::Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
