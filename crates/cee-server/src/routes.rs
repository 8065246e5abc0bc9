//! HTTP handlers.
//!
//! Every mode endpoint goes through the engine, so the role check, schema
//! validation, and audit record happen exactly as they do for `/api/route`.

use axum::{Json, Router};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use cee_core::{Caller, JobId, Mode};
use cee_runtime::{HealthStatus, Job, JobState, RouteResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::CallerIdentity;
use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/route`.
#[derive(Clone, Debug, Deserialize)]
pub struct RouteRequest {
    /// Free-text question to classify.
    pub text: String,
    /// Ignored in favour of the token's subject; accepted for older clients.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Body of `POST /api/jobs/{id}/cancel` responses.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// Job the request targeted.
    pub job_id: JobId,
    /// State after the request.
    pub state: JobState,
}

/// All routes, before state is attached.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/route", post(route))
        .route("/api/strategic/market", post(strategic_market))
        .route("/api/research/evaluate", post(research_evaluate))
        .route("/api/simulation/run", post(simulation_run))
        .route("/api/governance/check", post(governance_check))
        .route("/api/jobs/{id}", get(job_status))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.engine.health())
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("metrics recorder not installed".into()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}

/// POST /api/route
async fn route(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    body: Result<Json<RouteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RouteResponse>), ApiError> {
    let Json(request) = body.map_err(|r| malformed(&state, Mode::Unknown, &caller, r))?;
    if let (Some(claimed), Some(principal)) = (&request.user_id, caller.principal())
        && claimed != &principal.user_id
    {
        debug!(claimed = %claimed, user_id = %principal.user_id, "body user_id ignored");
    }
    let routed = state.engine.route(&caller, &request.text)?;
    Ok((StatusCode::ACCEPTED, Json(routed)))
}

/// POST /api/strategic/market
async fn strategic_market(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    invoke(&state, Mode::StrategicMarket, &caller, body).await
}

/// POST /api/research/evaluate
async fn research_evaluate(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    invoke(&state, Mode::ResearchEvaluate, &caller, body).await
}

/// POST /api/simulation/run
async fn simulation_run(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    invoke(&state, Mode::SimulationRun, &caller, body).await
}

/// POST /api/governance/check
async fn governance_check(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    invoke(&state, Mode::GovernanceCheck, &caller, body).await
}

async fn invoke(
    state: &AppState,
    mode: Mode,
    caller: &Caller,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(mut payload) = body.map_err(|r| malformed(state, mode, caller, r))?;
    if let Some(object) = payload.as_object_mut() {
        let _ = object.insert("user_id".into(), json!(caller.audit_user_id()));
    }
    let result = state.engine.invoke(mode, payload, caller).await?;
    Ok(Json(json!({ "result": result })))
}

/// Audit an undecodable body, then hand the extractor's status back.
fn malformed(state: &AppState, mode: Mode, caller: &Caller, rejection: JsonRejection) -> ApiError {
    state
        .engine
        .reject_malformed(mode, caller, &rejection.body_text());
    rejection.into()
}

/// GET /api/jobs/{id}
async fn job_status(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.engine.job(&JobId::from_string(id), &caller)?;
    Ok(Json(job))
}

/// POST /api/jobs/{id}/cancel
async fn cancel_job(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let job_id = JobId::from_string(id);
    let state_after = state.engine.cancel(&job_id, &caller)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            state: state_after,
        }),
    ))
}
