//! Governance checker: evaluates project metadata against a fixed rule set.

use async_trait::async_trait;
use cee_runtime::{AgentError, AgentHandler, JobContext};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::params::object_or_empty;

/// Accepted `data_classification` values.
pub const CLASSIFICATIONS: [&str; 4] = ["public", "internal", "confidential", "restricted"];
/// Longest retention accepted, in days.
pub const MAX_RETENTION_DAYS: u64 = 3_650;

/// One rule violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Rule name.
    pub rule: &'static str,
    /// What is wrong.
    pub message: String,
}

/// Overall risk derived from the violation count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    /// No violations.
    Low,
    /// One or two violations.
    Medium,
    /// Three or more, or any restricted-data violation.
    High,
}

type Check = fn(&Map<String, Value>) -> Option<String>;

struct Rule {
    name: &'static str,
    check: Check,
}

fn non_empty_str<'a>(meta: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    meta.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn classification(meta: &Map<String, Value>) -> Option<String> {
    non_empty_str(meta, "data_classification").map(str::to_lowercase)
}

fn owner_present(meta: &Map<String, Value>) -> Option<String> {
    non_empty_str(meta, "owner")
        .is_none()
        .then(|| "an accountable `owner` is required".to_string())
}

fn classification_valid(meta: &Map<String, Value>) -> Option<String> {
    match classification(meta) {
        None => Some("`data_classification` is required".to_string()),
        Some(c) if !CLASSIFICATIONS.contains(&c.as_str()) => Some(format!(
            "unknown data_classification `{c}` (expected one of {})",
            CLASSIFICATIONS.join(", ")
        )),
        Some(_) => None,
    }
}

fn pii_requires_consent(meta: &Map<String, Value>) -> Option<String> {
    let pii = meta.get("contains_pii").and_then(Value::as_bool).unwrap_or(false);
    let consent = meta.get("consent").and_then(Value::as_bool).unwrap_or(false);
    (pii && !consent).then(|| "personal data requires recorded `consent`".to_string())
}

fn retention_defined(meta: &Map<String, Value>) -> Option<String> {
    match meta.get("retention_days").and_then(Value::as_u64) {
        None => Some("`retention_days` must be a positive integer".to_string()),
        Some(0) => Some("`retention_days` must be at least 1".to_string()),
        Some(d) if d > MAX_RETENTION_DAYS => Some(format!(
            "`retention_days` {d} exceeds the {MAX_RETENTION_DAYS}-day maximum"
        )),
        Some(_) => None,
    }
}

fn restricted_requires_approval(meta: &Map<String, Value>) -> Option<String> {
    let restricted = classification(meta).is_some_and(|c| c == "restricted");
    (restricted && non_empty_str(meta, "approved_by").is_none())
        .then(|| "restricted data requires `approved_by`".to_string())
}

const RULES: &[Rule] = &[
    Rule {
        name: "owner_present",
        check: owner_present,
    },
    Rule {
        name: "data_classification",
        check: classification_valid,
    },
    Rule {
        name: "pii_requires_consent",
        check: pii_requires_consent,
    },
    Rule {
        name: "retention_defined",
        check: retention_defined,
    },
    Rule {
        name: "restricted_requires_approval",
        check: restricted_requires_approval,
    },
];

/// Evaluate `meta` against every rule, in rule order.
pub fn evaluate(meta: &Map<String, Value>) -> Vec<Violation> {
    RULES
        .iter()
        .filter_map(|rule| {
            (rule.check)(meta).map(|message| Violation {
                rule: rule.name,
                message,
            })
        })
        .collect()
}

fn risk(violations: &[Violation]) -> Risk {
    let restricted = violations
        .iter()
        .any(|v| v.rule == "restricted_requires_approval");
    match violations.len() {
        0 => Risk::Low,
        _ if restricted => Risk::High,
        1 | 2 => Risk::Medium,
        _ => Risk::High,
    }
}

/// Metadata rule checker.
#[derive(Clone, Copy, Debug, Default)]
pub struct GovernanceChecker;

impl GovernanceChecker {
    /// Create the checker.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentHandler for GovernanceChecker {
    #[instrument(skip_all, fields(job_id = %ctx.job_id))]
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, AgentError> {
        let meta = object_or_empty(&payload, "meta")?;
        let violations = evaluate(&meta);
        let risk = risk(&violations);
        debug!(violations = violations.len(), ?risk, "governance evaluated");
        Ok(json!({
            "compliant": violations.is_empty(),
            "risk": risk,
            "violations": violations,
            "checked": RULES.iter().map(|r| r.name).collect::<Vec<_>>(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::context;

    fn meta(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn rules(v: Value) -> Vec<&'static str> {
        evaluate(&meta(v)).into_iter().map(|v| v.rule).collect()
    }

    #[test]
    fn complete_metadata_passes() {
        let v = json!({
            "owner": "data-team",
            "data_classification": "Confidential",
            "contains_pii": true,
            "consent": true,
            "retention_days": 365,
        });
        assert!(rules(v).is_empty());
    }

    #[test]
    fn empty_metadata_fails_required_rules() {
        assert_eq!(
            rules(json!({})),
            vec!["owner_present", "data_classification", "retention_defined"]
        );
    }

    #[test]
    fn pii_without_consent_is_flagged() {
        let v = json!({
            "owner": "o",
            "data_classification": "internal",
            "contains_pii": true,
            "retention_days": 30,
        });
        assert_eq!(rules(v), vec!["pii_requires_consent"]);
    }

    #[test]
    fn restricted_needs_approval_and_is_high_risk() {
        let v = json!({
            "owner": "o",
            "data_classification": "restricted",
            "retention_days": 30,
        });
        let violations = evaluate(&meta(v));
        assert_eq!(violations.len(), 1);
        assert_eq!(risk(&violations), Risk::High);
    }

    #[test]
    fn retention_bounds() {
        let base = |days: Value| {
            json!({"owner": "o", "data_classification": "public", "retention_days": days})
        };
        assert_eq!(rules(base(json!(0))), vec!["retention_defined"]);
        assert_eq!(rules(base(json!(MAX_RETENTION_DAYS + 1))), vec!["retention_defined"]);
        assert!(rules(base(json!(MAX_RETENTION_DAYS))).is_empty());
    }

    #[test]
    fn unknown_classification_is_reported() {
        let v = json!({"owner": "o", "data_classification": "secret", "retention_days": 1});
        let violations = evaluate(&meta(v));
        assert!(violations[0].message.contains("secret"));
    }

    #[tokio::test]
    async fn handler_reports_compliance() {
        let out = GovernanceChecker::new()
            .execute(json!({"meta": {"owner": "o"}}), context())
            .await
            .unwrap();
        assert_eq!(out["compliant"], false);
        assert_eq!(out["risk"], "medium");
        assert_eq!(out["checked"].as_array().unwrap().len(), RULES.len());

        let out = GovernanceChecker::new()
            .execute(
                json!({"meta": {"owner": "o", "data_classification": "public", "retention_days": 90}}),
                context(),
            )
            .await
            .unwrap();
        assert_eq!(out["compliant"], true);
        assert_eq!(out["risk"], "low");
    }
}
