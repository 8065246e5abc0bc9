//! Reference agents behind the real engine.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use cee_agents::{AgentDeps, default_capabilities};
use cee_core::{Caller, Mode};
use cee_embeddings::{EmbeddingService, InMemoryVectorIndex, MockEmbeddingService};
use cee_runtime::{DenyReason, DispatchError, Engine, JobState};
use serde_json::json;

async fn engine() -> Engine {
    let embedder = Arc::new(MockEmbeddingService::new(128));
    let index = Arc::new(InMemoryVectorIndex::new(128));
    let text = "fintech payments for SMBs";
    index
        .upsert(
            "doc-1",
            embedder.embed_single(text).await.unwrap(),
            json!({"title": "SMB payments", "text": text}),
        )
        .unwrap();
    let deps = AgentDeps {
        embedder,
        search: index,
        top_k: 3,
    };
    Engine::builder()
        .capabilities(default_capabilities(&deps).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn fintech_question_is_answered_by_market_analyst() {
    let engine = engine().await;
    let caller = Caller::user("demo", "analyst");
    let routed = engine
        .route(
            &caller,
            "Should I launch a fintech startup targeting SMBs? Provide TAM, revenue ideas and initial costs.",
        )
        .unwrap();
    assert_eq!(routed.mode, Mode::StrategicMarket);

    let mut job = engine.job(&routed.job_id, &caller).unwrap();
    for _ in 0..200 {
        if job.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        job = engine.job(&routed.job_id, &caller).unwrap();
    }
    assert_eq!(job.state, JobState::Completed);
    let result = job.result.unwrap();
    assert_eq!(result["evidence"][0]["id"], "doc-1");
}

#[tokio::test]
async fn governance_is_admin_only() {
    let engine = engine().await;
    let err = engine
        .invoke(
            Mode::GovernanceCheck,
            json!({"meta": {}}),
            &Caller::user("ana", "analyst"),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        DispatchError::AuthorizationDenied {
            reason: DenyReason::RoleNotPermitted { .. }
        }
    );

    let report = engine
        .invoke(
            Mode::GovernanceCheck,
            json!({"meta": {"owner": "o", "data_classification": "public", "retention_days": 30}}),
            &Caller::user("root", "admin"),
        )
        .await
        .unwrap();
    assert_eq!(report["compliant"], true);
}

#[tokio::test]
async fn auditor_may_evaluate_but_not_simulate() {
    let engine = engine().await;
    let auditor = Caller::user("aud", "auditor");
    let out = engine
        .invoke(
            Mode::ResearchEvaluate,
            json!({"text": "fintech payments for SMBs", "evidence": ["fintech payments for SMBs"]}),
            &auditor,
        )
        .await
        .unwrap();
    assert_eq!(out["verdict"], "supported");

    assert!(
        engine
            .invoke(Mode::SimulationRun, json!({"trials": 10}), &auditor)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn simulation_schema_rejects_wrong_types_before_running() {
    let engine = engine().await;
    let err = engine
        .invoke(
            Mode::SimulationRun,
            json!({"trials": "many"}),
            &Caller::user("ana", "analyst"),
        )
        .await
        .unwrap_err();
    assert_matches!(err, DispatchError::InvalidPayload(m) if m.contains("trials"));
}

#[tokio::test]
async fn simulation_input_errors_fail_the_job() {
    let engine = engine().await;
    let err = engine
        .invoke(
            Mode::SimulationRun,
            json!({"inputs": {"price": [9, 1]}}),
            &Caller::user("ana", "analyst"),
        )
        .await
        .unwrap_err();
    let DispatchError::AgentExecution { job_id, message } = err else {
        panic!("expected agent failure");
    };
    assert!(message.contains("invalid input"));
    let job = engine
        .job(&job_id, &Caller::user("ana", "analyst"))
        .unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
}
