//! Orchestrator, classifier, and audit settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound for any job timeout.
pub const MIN_TIMEOUT_MS: u64 = 100;
/// Lower bound for the error summary length.
pub const MIN_ERROR_SUMMARY_BYTES: usize = 32;

/// Job orchestration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    /// Bound on synchronous dispatch, in milliseconds.
    pub sync_timeout_ms: u64,
    /// Bound on one asynchronous job execution, in milliseconds.
    pub async_timeout_ms: u64,
    /// Handlers allowed to run at once; further jobs wait in `queued`.
    pub max_concurrent_jobs: usize,
    /// Maximum length of a summarized agent error.
    pub error_summary_bytes: usize,
    /// Backoff for capabilities that opt into retries.
    pub retry: RetrySettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            sync_timeout_ms: 30_000,
            async_timeout_ms: 300_000,
            max_concurrent_jobs: 64,
            error_summary_bytes: 512,
            retry: RetrySettings::default(),
        }
    }
}

impl OrchestratorSettings {
    /// Synchronous dispatch bound.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Asynchronous execution bound.
    pub fn async_timeout(&self) -> Duration {
        Duration::from_millis(self.async_timeout_ms)
    }
}

/// Retry backoff parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Ceiling on attempts for retryable capabilities (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Intent classifier settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierSettings {
    /// Minimum keyword score before a mode counts as matched.
    pub min_score: u32,
    /// Bytes of request text considered; the rest is ignored.
    pub max_scan_bytes: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_score: 1,
            max_scan_bytes: 16 * 1024,
        }
    }
}

/// Where audit records go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// Process memory only (lost on restart).
    Memory,
    /// `SQLite` file at [`AuditSettings::sqlite_path`].
    #[default]
    Sqlite,
}

/// Audit trail storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditSettings {
    /// Storage backend.
    pub backend: AuditBackend,
    /// Database path; relative paths resolve under `~/.cee`.
    pub sqlite_path: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Sqlite,
            sqlite_path: "audit.db".to_string(),
        }
    }
}
