//! Minimal input contracts for agent payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON type a field must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// JSON string.
    String,
    /// Any JSON number.
    Number,
    /// Integral JSON number.
    Integer,
    /// JSON boolean.
    Bool,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// Anything, including null.
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct FieldSpec {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Shape a payload must have before a job is created.
///
/// Payloads are always JSON objects. Unlisted fields are allowed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// Schema accepting any object.
    pub fn any_object() -> Self {
        Self::default()
    }

    /// Require `name` to be present with type `kind`.
    #[must_use]
    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: true,
        });
        self
    }

    /// If `name` is present (and not null) it must have type `kind`.
    #[must_use]
    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: false,
        });
        self
    }

    /// Check `payload`, describing the first violation.
    pub fn validate(&self, payload: &Value) -> Result<(), String> {
        let Some(obj) = payload.as_object() else {
            return Err("payload must be a JSON object".into());
        };
        for field in &self.fields {
            match obj.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field `{}`", field.name));
                }
                None | Some(Value::Null) => {}
                Some(v) if !field.kind.accepts(v) => {
                    return Err(format!(
                        "field `{}` must be {}",
                        field.name,
                        field.kind.as_str()
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> InputSchema {
        InputSchema::any_object()
            .required("text", FieldKind::String)
            .optional("trials", FieldKind::Integer)
    }

    #[test]
    fn accepts_conforming_payload() {
        assert!(schema().validate(&json!({"text": "hi", "trials": 10, "extra": true})).is_ok());
        assert!(schema().validate(&json!({"text": "hi", "trials": null})).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let err = schema().validate(&json!({"trials": 3})).unwrap_err();
        assert_eq!(err, "missing required field `text`");
        assert!(schema().validate(&json!({"text": null})).is_err());
    }

    #[test]
    fn rejects_wrong_type() {
        let err = schema().validate(&json!({"text": "x", "trials": 2.5})).unwrap_err();
        assert_eq!(err, "field `trials` must be integer");
    }

    #[test]
    fn rejects_non_object() {
        assert!(InputSchema::any_object().validate(&json!([1, 2])).is_err());
        assert!(InputSchema::any_object().validate(&json!({})).is_ok());
    }
}
