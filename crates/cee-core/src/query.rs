//! Inbound query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Raw free-text request as submitted. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    user_id: String,
    text: String,
    submitted_at: DateTime<Utc>,
}

impl Query {
    /// Capture a query, stamping the submission time.
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            submitted_at: Utc::now(),
        }
    }

    /// Submitting user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Request text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the query was received.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Job payload form: `{"user_id": .., "text": ..}`.
    pub fn to_payload(&self) -> Value {
        json!({ "user_id": self.user_id, "text": self.text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_user_and_text() {
        let q = Query::new("u1", "hello");
        let p = q.to_payload();
        assert_eq!(p["user_id"], "u1");
        assert_eq!(p["text"], "hello");
    }

    #[test]
    fn submitted_at_is_recent() {
        let before = Utc::now();
        let q = Query::new("u1", "x");
        assert!(q.submitted_at() >= before);
    }
}
