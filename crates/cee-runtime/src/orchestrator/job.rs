//! Job record and state machine.

use chrono::{DateTime, Utc};
use cee_core::{JobId, Mode, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a job.
///
/// `Created → Queued → Running → {Completed, Failed}`, with `Cancelled`
/// reachable from `Queued` and `Running`. Only a job that ran can fail: one
/// that times out or is shut down while waiting for a slot is `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, not yet scheduled.
    Created,
    /// Scheduled, waiting for an execution slot.
    Queued,
    /// Handler is executing.
    Running,
    /// Handler returned a result.
    Completed,
    /// Handler failed, panicked, or timed out.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl JobState {
    /// Terminal states are absorbing.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Queued)
                | (Self::Queued, Self::Running | Self::Cancelled)
                | (Self::Running, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    /// State the job was in.
    pub from: JobState,
    /// State that was requested.
    pub to: JobState,
}

/// Why a job failed or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Handler returned an error or panicked.
    AgentExecution,
    /// Execution bound elapsed.
    Timeout,
    /// Cancelled by a caller.
    Cancelled,
    /// Cancelled by orchestrator shutdown.
    Shutdown,
}

/// Summarized failure attached to a terminal job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Failure class.
    pub kind: JobErrorKind,
    /// Human-readable, length-bounded message.
    pub message: String,
}

/// A tracked dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique id, never reused.
    pub id: JobId,
    /// Request that created the job.
    pub request_id: RequestId,
    /// Mode, fixed at creation.
    pub mode: Mode,
    /// Owner user id.
    pub owner: String,
    /// Input handed to the agent.
    pub payload: Value,
    /// Current state.
    pub state: JobState,
    /// Agent output once `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details once `Failed` or `Cancelled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Handler invocations so far.
    pub attempts: u32,
    /// Every state the job has been in, in order.
    pub history: Vec<JobState>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the handler first started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New job in `Created`.
    pub fn new(request_id: RequestId, mode: Mode, owner: impl Into<String>, payload: Value) -> Self {
        Self {
            id: JobId::generate(),
            request_id,
            mode,
            owner: owner.into(),
            payload,
            state: JobState::Created,
            result: None,
            error: None,
            attempts: 0,
            history: vec![JobState::Created],
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, stamping timestamps.
    pub fn transition(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        if next == JobState::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Move to `Completed` with `result`.
    pub fn complete(&mut self, result: Value) -> Result<(), TransitionError> {
        self.transition(JobState::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Move to `Failed` or `Cancelled` with `error`.
    pub fn fail(&mut self, terminal: JobState, error: JobError) -> Result<(), TransitionError> {
        self.transition(terminal)?;
        self.error = Some(error);
        Ok(())
    }

    /// Wall time from start to finish, if both happened.
    pub fn run_duration(&self) -> Option<std::time::Duration> {
        let start = self.started_at?;
        let end = self.completed_at?;
        (end - start).to_std().ok()
    }
}
