//! Runtime error types.

use std::time::Duration;

use cee_core::{JobId, Mode};

use crate::gate::DenyReason;

/// Errors returned to callers of the orchestrator.
///
/// Agent failures arrive here already summarized; raw handler errors and
/// panics never cross this boundary.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Caller is unauthenticated or lacks a permitted role.
    #[error("Authorization denied: {reason}")]
    AuthorizationDenied {
        /// Why the gate refused.
        reason: DenyReason,
    },

    /// No capability is registered for the mode.
    #[error("Unknown mode: {0}")]
    UnknownMode(Mode),

    /// Payload does not satisfy the capability's input schema.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The agent failed or panicked.
    #[error("Agent execution failed for {job_id}: {message}")]
    AgentExecution {
        /// Job that failed.
        job_id: JobId,
        /// Summarized cause.
        message: String,
    },

    /// Synchronous dispatch exceeded its bound.
    #[error("Job {job_id} timed out after {}ms", after.as_millis())]
    Timeout {
        /// Job that timed out.
        job_id: JobId,
        /// The bound that elapsed.
        after: Duration,
    },

    /// The job was cancelled before producing a result.
    #[error("Job {job_id} was cancelled")]
    Cancelled {
        /// Cancelled job.
        job_id: JobId,
    },

    /// No job with this id exists.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The orchestrator is shutting down and admits no new work.
    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    /// Error category string for logs, metrics, and API bodies.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::UnknownMode(_) => "unknown_mode",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::AgentExecution { .. } => "agent_execution_error",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::JobNotFound(_) => "job_not_found",
            Self::ShuttingDown => "shutting_down",
        }
    }

    /// Whether the caller failed to authenticate at all.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationDenied {
                reason: DenyReason::Unauthenticated
            }
        )
    }

    /// Job the error refers to, if one was created.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::AgentExecution { job_id, .. }
            | Self::Timeout { job_id, .. }
            | Self::Cancelled { job_id }
            | Self::JobNotFound(job_id) => Some(job_id),
            Self::AuthorizationDenied { .. }
            | Self::UnknownMode(_)
            | Self::InvalidPayload(_)
            | Self::ShuttingDown => None,
        }
    }
}

/// Errors from registering capabilities.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// `unknown` can never have a capability.
    #[error("cannot register a capability for mode `unknown`")]
    UnknownMode,

    /// The registry no longer accepts registrations.
    #[error("registry is sealed; capability for {0} rejected")]
    Sealed(Mode),

    /// A capability must name at least one role.
    #[error("required roles must not be empty")]
    EmptyRoles,
}
