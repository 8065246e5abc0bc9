//! Payload extraction helpers.
//!
//! Schemas have already checked field types by the time an agent runs; these
//! helpers cover the checks schemas cannot express (non-empty, ranges).

use cee_runtime::AgentError;
use serde_json::{Map, Value};

/// Required non-empty string.
pub fn required_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, AgentError> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_) | Value::Null) | None => Err(AgentError::InvalidInput(format!(
            "`{field}` must be a non-empty string"
        ))),
        Some(_) => Err(AgentError::InvalidInput(format!(
            "`{field}` must be a string"
        ))),
    }
}

/// Optional unsigned integer.
pub fn optional_u64(payload: &Value, field: &str) -> Result<Option<u64>, AgentError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| AgentError::InvalidInput(format!("`{field}` must be a non-negative integer"))),
    }
}

/// Optional object; absent or null yields an empty map.
pub fn object_or_empty(payload: &Value, field: &str) -> Result<Map<String, Value>, AgentError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(AgentError::InvalidInput(format!(
            "`{field}` must be an object"
        ))),
    }
}

/// Optional array of strings. Non-string items are rejected.
pub fn string_list(payload: &Value, field: &str) -> Result<Vec<String>, AgentError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str().map(String::from).ok_or_else(|| {
                    AgentError::InvalidInput(format!("`{field}[{i}]` must be a string"))
                })
            })
            .collect(),
        Some(_) => Err(AgentError::InvalidInput(format!(
            "`{field}` must be an array of strings"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn required_str_rejects_blank() {
        assert_eq!(required_str(&json!({"text": "hi"}), "text").unwrap(), "hi");
        assert_matches!(
            required_str(&json!({"text": "  "}), "text"),
            Err(AgentError::InvalidInput(_))
        );
        assert_matches!(required_str(&json!({}), "text"), Err(AgentError::InvalidInput(_)));
        assert_matches!(
            required_str(&json!({"text": 3}), "text"),
            Err(AgentError::InvalidInput(m)) if m.contains("must be a string")
        );
    }

    #[test]
    fn optional_u64_accepts_absent_and_null() {
        assert_eq!(optional_u64(&json!({}), "n").unwrap(), None);
        assert_eq!(optional_u64(&json!({"n": null}), "n").unwrap(), None);
        assert_eq!(optional_u64(&json!({"n": 7}), "n").unwrap(), Some(7));
        assert!(optional_u64(&json!({"n": -1}), "n").is_err());
    }

    #[test]
    fn string_list_reports_bad_index() {
        assert_eq!(
            string_list(&json!({"e": ["a", "b"]}), "e").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_matches!(
            string_list(&json!({"e": ["a", 1]}), "e"),
            Err(AgentError::InvalidInput(m)) if m.contains("e[1]")
        );
    }

    #[test]
    fn object_or_empty_defaults() {
        assert!(object_or_empty(&json!({}), "meta").unwrap().is_empty());
        assert_eq!(object_or_empty(&json!({"meta": {"a": 1}}), "meta").unwrap().len(), 1);
        assert!(object_or_empty(&json!({"meta": []}), "meta").is_err());
    }
}
