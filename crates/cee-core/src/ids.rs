//! Branded ID newtypes for type safety.
//!
//! Job ids and request ids are distinct types so a request id can never be
//! passed where a job id is expected. Both are prefixed UUID v7 strings
//! (time-ordered); generation needs no shared lock, so id allocation never
//! serializes concurrent dispatches.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Id prefix, including the trailing underscore.
            pub const PREFIX: &'static str = $prefix;

            /// Allocate a fresh id.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, Uuid::now_v7().simple()))
            }

            /// Wrap an existing string value (e.g. from a URL path).
            #[must_use]
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the value carries this id's prefix.
            #[must_use]
            pub fn is_well_formed(&self) -> bool {
                self.0.len() > $prefix.len() && self.0.starts_with($prefix)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Identifier of a dispatched job. Assigned once at creation, never reused.
    JobId,
    "job_"
);

branded_id!(
    /// Identifier of one inbound request; keys its audit record.
    RequestId,
    "req_"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn job_id_has_prefix() {
        let id = JobId::generate();
        assert!(id.as_str().starts_with("job_"));
        assert!(id.is_well_formed());
    }

    #[test]
    fn request_id_has_prefix() {
        assert!(RequestId::generate().as_str().starts_with("req_"));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let ids: HashSet<JobId> = (0..10_000).map(|_| JobId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn ids_are_distinct_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| JobId::generate()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 4000);
    }

    #[test]
    fn from_string_is_not_validated() {
        let id = JobId::from_string("whatever");
        assert_eq!(id.as_str(), "whatever");
        assert!(!id.is_well_formed());
    }

    #[test]
    fn serializes_transparently() {
        let id = JobId::from_string("job_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"job_abc\"");
        let back: JobId = serde_json::from_str("\"job_abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = RequestId::from("req_1");
        assert_eq!(id.to_string(), "req_1");
    }
}
