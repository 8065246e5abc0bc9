//! Audit trail: one record per inbound request.
//!
//! The orchestrator hands records to an [`AuditTrail`], which forwards them to
//! a single background writer over an unbounded channel. Callers never wait
//! on storage and storage failures never fail a request; they are logged and
//! counted. Because there is one writer fed in FIFO order, a request's
//! decision record is always written before its outcome update.

mod memory;
mod sqlite;

pub use memory::InMemoryAuditSink;
pub use sqlite::SqliteAuditSink;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cee_core::metrics::AUDIT_WRITE_FAILURES_TOTAL;
use cee_core::{JobId, Mode, RequestId};
use cee_settings::{AuditBackend, AuditSettings};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Outcome of the authorization/lookup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    /// Caller passed the gate and the mode resolved.
    Authorized,
    /// Caller was refused.
    Denied,
    /// No capability for the mode.
    UnknownMode,
    /// Request body could not be read; nothing was dispatched.
    Malformed,
}

impl AuditDecision {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::UnknownMode => "unknown_mode",
            Self::Malformed => "malformed",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorized" => Some(Self::Authorized),
            "denied" => Some(Self::Denied),
            "unknown_mode" => Some(Self::UnknownMode),
            "malformed" => Some(Self::Malformed),
            _ => None,
        }
    }
}

/// How the request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// A job exists and has not finished.
    Pending,
    /// The job completed.
    Completed,
    /// Refused, rejected, or the job failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
}

impl AuditOutcome {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One audited request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Request identifier.
    pub request_id: RequestId,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Caller (`"anonymous"` if unauthenticated).
    pub user_id: String,
    /// Requested mode.
    pub mode: Mode,
    /// Gate / lookup decision.
    pub decision: AuditDecision,
    /// Current outcome.
    pub outcome: AuditOutcome,
    /// Job created for the request, if any.
    pub job_id: Option<JobId>,
    /// Free-form reason or error summary.
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Record stamped now.
    pub fn new(
        request_id: RequestId,
        user_id: impl Into<String>,
        mode: Mode,
        decision: AuditDecision,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            user_id: user_id.into(),
            mode,
            decision,
            outcome,
            job_id: None,
            detail: None,
        }
    }

    /// Attach the job id.
    #[must_use]
    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Attach a detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outcome change for an existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeUpdate {
    /// Record to update.
    pub request_id: RequestId,
    /// New outcome.
    pub outcome: AuditOutcome,
    /// Replacement detail, if any.
    pub detail: Option<String>,
}

/// Audit storage errors. Never surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// `SQLite` error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Connection pool error.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    /// Outcome update for a record that was never appended.
    #[error("no audit record for {0}")]
    NotFound(RequestId),
    /// Storage unavailable for another reason.
    #[error("audit storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage behind the audit trail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a new record.
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError>;

    /// Update the outcome of a previously appended record.
    async fn record_outcome(&self, update: OutcomeUpdate) -> Result<(), AuditError>;
}

/// Open the sink selected by `settings`.
///
/// A relative `SQLite` path is resolved against `base_dir`.
pub fn open_sink(settings: &AuditSettings, base_dir: &Path) -> Result<Arc<dyn AuditSink>, AuditError> {
    match settings.backend {
        AuditBackend::Memory => {
            info!("audit backend: memory");
            Ok(Arc::new(InMemoryAuditSink::new()))
        }
        AuditBackend::Sqlite => {
            let path = base_dir.join(&settings.sqlite_path);
            info!(path = %path.display(), "audit backend: sqlite");
            Ok(Arc::new(SqliteAuditSink::open(&path)?))
        }
    }
}

enum Command {
    Append(AuditRecord),
    Outcome(OutcomeUpdate),
    Flush(oneshot::Sender<()>),
}

/// Non-blocking front end for an [`AuditSink`].
#[derive(Clone)]
pub struct AuditTrail {
    tx: mpsc::UnboundedSender<Command>,
    failures: Arc<AtomicU64>,
}

impl AuditTrail {
    /// Spawn the background writer on the current Tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let failures = Arc::new(AtomicU64::new(0));
        let writer_failures = Arc::clone(&failures);

        drop(tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let result = match cmd {
                    Command::Append(record) => {
                        let request_id = record.request_id.clone();
                        sink.append(record).await.map_err(|e| (request_id, e))
                    }
                    Command::Outcome(update) => {
                        let request_id = update.request_id.clone();
                        sink.record_outcome(update).await.map_err(|e| (request_id, e))
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                        Ok(())
                    }
                };
                if let Err((request_id, error)) = result {
                    let _ = writer_failures.fetch_add(1, Ordering::Relaxed);
                    counter!(AUDIT_WRITE_FAILURES_TOTAL).increment(1);
                    warn!(%request_id, %error, "audit write failed");
                }
            }
            debug!("audit writer stopped");
        }));

        Self { tx, failures }
    }

    /// Queue a new record. Never blocks.
    pub fn append(&self, record: AuditRecord) {
        self.send(Command::Append(record));
    }

    /// Queue an outcome update. Never blocks.
    pub fn record_outcome(
        &self,
        request_id: RequestId,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) {
        self.send(Command::Outcome(OutcomeUpdate {
            request_id,
            outcome,
            detail,
        }));
    }

    /// Wait until every command queued before this call has been processed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Number of writes that failed since start.
    pub fn write_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            let _ = self.failures.fetch_add(1, Ordering::Relaxed);
            counter!(AUDIT_WRITE_FAILURES_TOTAL).increment(1);
            warn!("audit writer is gone, record dropped");
        }
    }
}
