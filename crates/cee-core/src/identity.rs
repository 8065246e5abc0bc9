//! Caller identity: roles, principals, and the authenticated/anonymous split.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A caller role such as `admin`, `analyst`, `auditor` or `guest`.
///
/// Roles are normalized to trimmed lowercase so `"Admin"` and `"admin"`
/// compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    /// Administrator role. Also allowed to cancel other users' jobs.
    pub const ADMIN: &'static str = "admin";
    /// Analyst role.
    pub const ANALYST: &'static str = "analyst";
    /// Auditor role.
    pub const AUDITOR: &'static str = "auditor";
    /// Least-privileged role.
    pub const GUEST: &'static str = "guest";

    /// Build a normalized role.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Role name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable user identifier.
    pub user_id: String,
    /// The single role the user acts under.
    pub role: Role,
}

impl Principal {
    /// Build a principal.
    pub fn new(user_id: impl Into<String>, role: impl Into<Role>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

/// Who is making a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    /// No valid credentials were presented.
    Anonymous,
    /// Credentials were verified.
    Authenticated(Principal),
}

impl Caller {
    /// Shorthand for an authenticated caller.
    pub fn user(user_id: impl Into<String>, role: impl Into<Role>) -> Self {
        Self::Authenticated(Principal::new(user_id, role))
    }

    /// The principal, if authenticated.
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(p) => Some(p),
        }
    }

    /// User id for logs and audit records (`"anonymous"` when unauthenticated).
    #[must_use]
    pub fn audit_user_id(&self) -> &str {
        self.principal().map_or("anonymous", |p| p.user_id.as_str())
    }
}
