//! Process-scoped facade: classifier + registry + orchestrator.
//!
//! Built once at startup and shared (behind an `Arc`) with every request
//! handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cee_core::{Caller, JobId, Mode, Query};
use cee_settings::{CeeSettings, ClassifierSettings};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::audit::{AuditSink, AuditTrail, InMemoryAuditSink};
use crate::classifier::{IntentClassifier, KeywordClassifier};
use crate::errors::{DispatchError, RegistryError};
use crate::orchestrator::{InMemoryJobStore, Job, JobOrchestrator, JobState, JobStore, OrchestratorConfig};
use crate::registry::{AgentCapability, AgentRegistry};

/// Result of an asynchronous route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteResponse {
    /// Mode the text was classified into.
    pub mode: Mode,
    /// Job tracking the dispatch.
    pub job_id: JobId,
}

/// Liveness snapshot.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Seconds since the engine was built.
    pub uptime_secs: u64,
    /// Jobs not yet terminal.
    pub active_jobs: usize,
    /// Modes with a registered capability.
    pub modes: Vec<Mode>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: OrchestratorConfig,
    classifier_settings: ClassifierSettings,
    classifier: Option<Arc<dyn IntentClassifier>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    job_store: Option<Arc<dyn JobStore>>,
    capabilities: Vec<AgentCapability>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            classifier_settings: ClassifierSettings::default(),
            classifier: None,
            audit_sink: None,
            job_store: None,
            capabilities: Vec::new(),
        }
    }
}

impl EngineBuilder {
    /// Builder seeded from loaded settings.
    pub fn from_settings(settings: &CeeSettings) -> Self {
        Self {
            config: OrchestratorConfig::from(&settings.orchestrator),
            classifier_settings: settings.classifier.clone(),
            ..Self::default()
        }
    }

    /// Override orchestrator tuning.
    #[must_use]
    pub fn orchestrator_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom classifier instead of the keyword classifier.
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Audit storage. Defaults to [`InMemoryAuditSink`].
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Job storage. Defaults to [`InMemoryJobStore`].
    #[must_use]
    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(store);
        self
    }

    /// Register a capability at build time.
    #[must_use]
    pub fn capability(mut self, capability: AgentCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Register several capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = AgentCapability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// Register every capability, seal the registry, and start the audit writer.
    ///
    /// Must run inside a Tokio runtime.
    pub fn build(self) -> Result<Engine, RegistryError> {
        let registry = Arc::new(AgentRegistry::new());
        for capability in self.capabilities {
            let _ = registry.register(capability)?;
        }
        registry.seal();

        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(KeywordClassifier::new(&self.classifier_settings)));
        let sink = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(InMemoryAuditSink::new()));
        let store = self
            .job_store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new()));

        let orchestrator = Arc::new(JobOrchestrator::new(
            registry,
            AuditTrail::spawn(sink),
            store,
            self.config,
        ));
        info!(modes = ?orchestrator.registry().modes(), "engine ready");

        Ok(Engine {
            classifier,
            orchestrator,
            started_at: Instant::now(),
        })
    }
}

/// Intent routing and dispatch for one process.
pub struct Engine {
    classifier: Arc<dyn IntentClassifier>,
    orchestrator: Arc<JobOrchestrator>,
    started_at: Instant,
}

impl Engine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Mode for `text`.
    pub fn classify(&self, text: &str) -> Mode {
        self.classifier.classify(text)
    }

    /// Classify `text` and dispatch it asynchronously.
    ///
    /// The job payload is `{"user_id", "text"}`.
    pub fn route(&self, caller: &Caller, text: &str) -> Result<RouteResponse, DispatchError> {
        let mode = self.classify(text);
        let query = Query::new(caller.audit_user_id(), text);
        let job_id = self.orchestrator.run(mode, query.to_payload(), caller)?;
        Ok(RouteResponse { mode, job_id })
    }

    /// Dispatch directly to `mode` and wait for the result.
    pub async fn invoke(
        &self,
        mode: Mode,
        payload: Value,
        caller: &Caller,
    ) -> Result<Value, DispatchError> {
        self.orchestrator.run_sync(mode, payload, caller).await
    }

    /// Audit a request rejected before dispatch because its body was unreadable.
    pub fn reject_malformed(&self, mode: Mode, caller: &Caller, detail: &str) {
        self.orchestrator.reject_malformed(mode, caller, detail);
    }

    /// Job snapshot visible to `caller`.
    pub fn job(&self, job_id: &JobId, caller: &Caller) -> Result<Job, DispatchError> {
        self.orchestrator.job_for(job_id, caller)
    }

    /// Request cancellation of a job.
    pub fn cancel(&self, job_id: &JobId, caller: &Caller) -> Result<JobState, DispatchError> {
        self.orchestrator.cancel(job_id, caller)
    }

    /// Liveness snapshot. No side effects.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            uptime_secs: self.started_at.elapsed().as_secs(),
            active_jobs: self.orchestrator.active_job_count(),
            modes: self.orchestrator.registry().modes(),
        }
    }

    /// Underlying orchestrator.
    pub fn orchestrator(&self) -> &Arc<JobOrchestrator> {
        &self.orchestrator
    }

    /// Cancel live jobs and flush the audit trail.
    pub async fn shutdown(&self, grace: Duration) {
        self.orchestrator.shutdown(grace).await;
    }
}
