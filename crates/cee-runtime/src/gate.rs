//! Role-based authorization.
//!
//! The gate is pure: the decision depends only on the caller and the allowed
//! role set. The orchestrator invokes it uniformly for every dispatch.

use std::collections::BTreeSet;
use std::fmt;

use cee_core::{Caller, Role};
use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;

/// A non-empty set of roles permitted to use a capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Role>", into = "Vec<Role>")]
pub struct RequiredRoles(BTreeSet<Role>);

impl RequiredRoles {
    /// Build from role names. Fails on an empty set.
    pub fn new<I, R>(roles: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        let set: BTreeSet<Role> = roles.into_iter().map(Into::into).collect();
        if set.is_empty() {
            return Err(RegistryError::EmptyRoles);
        }
        Ok(Self(set))
    }

    /// Whether `role` is permitted.
    pub fn contains(&self, role: &Role) -> bool {
        self.0.contains(role)
    }

    /// Iterate the permitted roles in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Role>> for RequiredRoles {
    type Error = RegistryError;

    fn try_from(v: Vec<Role>) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<RequiredRoles> for Vec<Role> {
    fn from(r: RequiredRoles) -> Self {
        r.0.into_iter().collect()
    }
}

impl fmt::Display for RequiredRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Role::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Why a request was refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    /// No verified identity.
    Unauthenticated,
    /// The caller's role is not in the allowed set.
    RoleNotPermitted {
        /// The caller's role.
        role: String,
    },
    /// Only the job owner or an admin may act on a job.
    NotJobOwner,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("caller is not authenticated"),
            Self::RoleNotPermitted { role } => write!(f, "role `{role}` is not permitted"),
            Self::NotJobOwner => f.write_str("caller does not own the job"),
        }
    }
}

/// Result of an authorization check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Proceed.
    Allowed,
    /// Refuse, with the reason.
    Denied(DenyReason),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Checks callers against allowed role sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthorizationGate;

impl AuthorizationGate {
    /// Create a gate.
    pub fn new() -> Self {
        Self
    }

    /// Denied iff the caller is unauthenticated or its role is not allowed.
    pub fn authorize(&self, caller: &Caller, allowed: &RequiredRoles) -> Decision {
        match caller.principal() {
            None => Decision::Denied(DenyReason::Unauthenticated),
            Some(p) if allowed.contains(&p.role) => Decision::Allowed,
            Some(p) => Decision::Denied(DenyReason::RoleNotPermitted {
                role: p.role.as_str().to_string(),
            }),
        }
    }
}
