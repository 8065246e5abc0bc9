//! # cee-agents
//!
//! The four reference agents, each an [`AgentHandler`]:
//!
//! | mode | agent | roles |
//! |---|---|---|
//! | `strategic_market` | [`MarketAnalyst`] | admin, analyst |
//! | `research_evaluate` | [`EvaluationAgent`] | admin, analyst, auditor |
//! | `simulation_run` | [`SimulationEngine`] | admin, analyst |
//! | `governance_check` | [`GovernanceChecker`] | admin |
//!
//! [`default_capabilities`] packages them for `EngineBuilder::capabilities`.
//!
//! ## Crate Position
//!
//! Depends on: cee-core, cee-embeddings, cee-runtime.
//! Depended on by: cee-server, cee-engine.

#![deny(unsafe_code)]

pub mod evaluation;
pub mod governance;
pub mod market;
mod params;
pub mod simulation;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use cee_core::{Mode, Role};
use cee_embeddings::{EmbeddingError, EmbeddingService, VectorSearch};
use cee_runtime::{
    AgentCapability, AgentError, AgentHandler, FieldKind, InputSchema, RegistryError,
    RequiredRoles, RetryPolicy,
};

pub use evaluation::EvaluationAgent;
pub use governance::GovernanceChecker;
pub use market::MarketAnalyst;
pub use simulation::SimulationEngine;

/// Collaborators shared by the reference agents.
#[derive(Clone)]
pub struct AgentDeps {
    /// Text embedder.
    pub embedder: Arc<dyn EmbeddingService>,
    /// Document collection.
    pub search: Arc<dyn VectorSearch>,
    /// Documents retrieved per query.
    pub top_k: usize,
}

/// Attempts allowed for the read-only retrieval agents.
const RETRIEVAL_ATTEMPTS: u32 = 3;

/// Capabilities for all four modes with their role policies and input shapes.
pub fn default_capabilities(deps: &AgentDeps) -> Result<Vec<AgentCapability>, RegistryError> {
    let market: Arc<dyn AgentHandler> = Arc::new(MarketAnalyst::new(
        Arc::clone(&deps.embedder),
        Arc::clone(&deps.search),
        deps.top_k,
    ));
    let evaluation: Arc<dyn AgentHandler> = Arc::new(
        EvaluationAgent::new(Arc::clone(&deps.embedder))
            .with_search(Arc::clone(&deps.search), deps.top_k),
    );

    Ok(vec![
        AgentCapability::new(
            Mode::StrategicMarket,
            RequiredRoles::new([Role::ADMIN, Role::ANALYST])?,
            market,
        )
        .with_schema(
            InputSchema::any_object()
                .required("text", FieldKind::String)
                .optional("user_id", FieldKind::String),
        )
        .with_retry(RetryPolicy::Idempotent {
            max_attempts: RETRIEVAL_ATTEMPTS,
        }),
        AgentCapability::new(
            Mode::ResearchEvaluate,
            RequiredRoles::new([Role::ADMIN, Role::ANALYST, Role::AUDITOR])?,
            evaluation,
        )
        .with_schema(
            InputSchema::any_object()
                .required("text", FieldKind::String)
                .optional("evidence", FieldKind::Array),
        )
        .with_retry(RetryPolicy::Idempotent {
            max_attempts: RETRIEVAL_ATTEMPTS,
        }),
        AgentCapability::new(
            Mode::SimulationRun,
            RequiredRoles::new([Role::ADMIN, Role::ANALYST])?,
            Arc::new(SimulationEngine::new()),
        )
        .with_schema(
            InputSchema::any_object()
                .optional("inputs", FieldKind::Object)
                .optional("trials", FieldKind::Integer)
                .optional("seed", FieldKind::Integer),
        ),
        AgentCapability::new(
            Mode::GovernanceCheck,
            RequiredRoles::new([Role::ADMIN])?,
            Arc::new(GovernanceChecker::new()),
        )
        .with_schema(InputSchema::any_object().optional("meta", FieldKind::Object)),
    ])
}

/// Map a collaborator failure onto the agent error contract.
pub(crate) fn collaborator_error(err: EmbeddingError) -> AgentError {
    if err.is_transient() {
        AgentError::Unavailable(err.to_string())
    } else {
        AgentError::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cee_embeddings::{InMemoryVectorIndex, MockEmbeddingService};

    fn deps() -> AgentDeps {
        AgentDeps {
            embedder: Arc::new(MockEmbeddingService::new(32)),
            search: Arc::new(InMemoryVectorIndex::new(32)),
            top_k: 3,
        }
    }

    #[test]
    fn every_routable_mode_is_covered() {
        let caps = default_capabilities(&deps()).unwrap();
        let mut modes: Vec<Mode> = caps.iter().map(|c| c.mode).collect();
        modes.sort();
        let mut expected = Mode::ROUTABLE.to_vec();
        expected.sort();
        assert_eq!(modes, expected);
    }

    #[test]
    fn role_policies() {
        let caps = default_capabilities(&deps()).unwrap();
        let roles = |mode: Mode| {
            caps.iter()
                .find(|c| c.mode == mode)
                .unwrap()
                .required_roles
                .to_string()
        };
        assert_eq!(roles(Mode::StrategicMarket), "{admin, analyst}");
        assert_eq!(roles(Mode::ResearchEvaluate), "{admin, analyst, auditor}");
        assert_eq!(roles(Mode::SimulationRun), "{admin, analyst}");
        assert_eq!(roles(Mode::GovernanceCheck), "{admin}");
    }

    #[test]
    fn transient_collaborator_errors_are_retryable() {
        assert!(collaborator_error(EmbeddingError::NotReady).is_retryable());
        assert!(!collaborator_error(EmbeddingError::Config("x".into())).is_retryable());
    }
}
