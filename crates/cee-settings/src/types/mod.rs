//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the keys it overrides.

mod collaborators;
mod runtime;
mod server;

pub use collaborators::*;
pub use runtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8000 },
///   "orchestrator": { "syncTimeoutMs": 30000 },
///   "collaborators": { "qdrantUrl": "http://qdrant:6333" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CeeSettings {
    /// Settings schema version.
    pub version: String,
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Job orchestration settings.
    pub orchestrator: OrchestratorSettings,
    /// Intent classifier settings.
    pub classifier: ClassifierSettings,
    /// Bearer token verification.
    pub auth: AuthSettings,
    /// Audit trail storage.
    pub audit: AuditSettings,
    /// Vector search and embedding collaborators.
    pub collaborators: CollaboratorSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for CeeSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            classifier: ClassifierSettings::default(),
            auth: AuthSettings::default(),
            audit: AuditSettings::default(),
            collaborators: CollaboratorSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl CeeSettings {
    /// Correct values that would break runtime invariants.
    ///
    /// Called automatically during loading. Out-of-range values are corrected
    /// with a warning rather than rejected.
    pub fn validate(&mut self) {
        let orch = &mut self.orchestrator;
        if orch.sync_timeout_ms < MIN_TIMEOUT_MS {
            tracing::warn!(
                "syncTimeoutMs ({}) below minimum, raised to {MIN_TIMEOUT_MS}",
                orch.sync_timeout_ms
            );
            orch.sync_timeout_ms = MIN_TIMEOUT_MS;
        }
        if orch.async_timeout_ms < orch.sync_timeout_ms {
            tracing::warn!(
                "asyncTimeoutMs ({}) < syncTimeoutMs ({}), correcting",
                orch.async_timeout_ms,
                orch.sync_timeout_ms
            );
            orch.async_timeout_ms = orch.sync_timeout_ms;
        }
        if orch.max_concurrent_jobs == 0 {
            tracing::warn!("maxConcurrentJobs is 0, raised to 1");
            orch.max_concurrent_jobs = 1;
        }
        if orch.error_summary_bytes < MIN_ERROR_SUMMARY_BYTES {
            orch.error_summary_bytes = MIN_ERROR_SUMMARY_BYTES;
        }
        let retry = &mut orch.retry;
        if retry.max_delay_ms < retry.base_delay_ms {
            retry.max_delay_ms = retry.base_delay_ms;
        }
        if retry.max_attempts == 0 {
            retry.max_attempts = 1;
        }

        if self.classifier.min_score == 0 {
            tracing::warn!("classifier minScore is 0, raised to 1");
            self.classifier.min_score = 1;
        }

        if self.collaborators.embedding_dimensions == 0 {
            tracing::warn!("embeddingDimensions is 0, reset to default");
            self.collaborators.embedding_dimensions = DEFAULT_EMBEDDING_DIMENSIONS;
        }
    }
}
