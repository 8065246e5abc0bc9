//! # cee-runtime
//!
//! Intent routing, authorization, and job orchestration.
//!
//! - **Classifier**: [`IntentClassifier`] maps request text to a [`Mode`](cee_core::Mode)
//! - **Gate**: [`AuthorizationGate`] checks a caller's role against a capability
//! - **Registry**: [`AgentRegistry`] holds the mode → [`AgentCapability`] table
//! - **Audit**: [`AuditTrail`] records one decision per request, off the hot path
//! - **Orchestrator**: [`JobOrchestrator`] admits, tracks, and executes jobs
//! - **Engine**: [`Engine`] wires the above together for a process
//!
//! ## Crate Position
//!
//! Depends on: cee-core, cee-settings.
//! Depended on by: cee-agents, cee-server, cee-engine.

#![deny(unsafe_code)]

pub mod audit;
pub mod classifier;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod orchestrator;
pub mod registry;

pub use audit::{
    AuditDecision, AuditOutcome, AuditRecord, AuditSink, AuditTrail, InMemoryAuditSink,
    SqliteAuditSink,
};
pub use classifier::{IntentClassifier, KeywordClassifier};
pub use engine::{Engine, EngineBuilder, HealthStatus, RouteResponse};
pub use errors::{DispatchError, RegistryError};
pub use gate::{AuthorizationGate, Decision, DenyReason, RequiredRoles};
pub use orchestrator::{
    InMemoryJobStore, Job, JobError, JobErrorKind, JobOrchestrator, JobState, JobStore,
    OrchestratorConfig,
};
pub use registry::{
    AgentCapability, AgentError, AgentHandler, AgentRegistry, FieldKind, InputSchema,
    JobContext, Registration, RetryPolicy,
};
