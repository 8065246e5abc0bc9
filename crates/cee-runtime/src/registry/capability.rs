//! Agent capabilities: what a mode needs (roles, input shape) and who runs it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cee_core::{JobId, Mode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::gate::RequiredRoles;
use crate::registry::schema::InputSchema;

/// Failure reported by an agent handler.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The payload passed the schema but is still unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator was unavailable. Safe to retry for idempotent agents.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The agent observed cancellation and stopped.
    #[error("cancelled")]
    Cancelled,

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl AgentError {
    /// Whether a retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Per-execution context handed to a handler.
#[derive(Clone, Debug)]
pub struct JobContext {
    /// Job being executed.
    pub job_id: JobId,
    /// Mode of the job.
    pub mode: Mode,
    /// Owner of the job.
    pub user_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    cancel: CancellationToken,
}

impl JobContext {
    /// Build a context.
    pub fn new(
        job_id: JobId,
        mode: Mode,
        user_id: impl Into<String>,
        attempt: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            mode,
            user_id: user_id.into(),
            attempt,
            cancel,
        }
    }

    /// Whether the job has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the job is asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// A processing agent. All agents share this single contract.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Run the agent on `payload`, producing a JSON result.
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, AgentError>;
}

/// Whether failed invocations may be re-attempted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most one invocation per job.
    #[default]
    Never,
    /// The handler is idempotent: retry errors it marks retryable.
    Idempotent {
        /// Ceiling on invocations, first one included.
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// Maximum invocations permitted.
    pub fn max_attempts(self) -> u32 {
        match self {
            Self::Never => 1,
            Self::Idempotent { max_attempts } => max_attempts.max(1),
        }
    }
}

/// Registration record for a mode.
#[derive(Clone)]
pub struct AgentCapability {
    /// Mode served.
    pub mode: Mode,
    /// Roles permitted to dispatch to this mode.
    pub required_roles: RequiredRoles,
    /// Executor.
    pub handler: Arc<dyn AgentHandler>,
    /// Shape the payload must have.
    pub input_schema: InputSchema,
    /// Retry behavior.
    pub retry: RetryPolicy,
}

impl AgentCapability {
    /// Capability with an open schema and no retries.
    pub fn new(mode: Mode, required_roles: RequiredRoles, handler: Arc<dyn AgentHandler>) -> Self {
        Self {
            mode,
            required_roles,
            handler,
            input_schema: InputSchema::any_object(),
            retry: RetryPolicy::Never,
        }
    }

    /// Replace the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Same mode, roles, schema, retry policy and handler instance.
    pub fn same_as(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.required_roles == other.required_roles
            && self.input_schema == other.input_schema
            && self.retry == other.retry
            && Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCapability")
            .field("mode", &self.mode)
            .field("required_roles", &self.required_roles)
            .field("input_schema", &self.input_schema)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
