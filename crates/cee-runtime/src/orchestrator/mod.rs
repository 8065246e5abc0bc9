//! Job orchestrator: admission, execution, cancellation.
//!
//! Every dispatch runs the same admission sequence:
//! 1. shutdown in progress → `ShuttingDown`
//! 2. unauthenticated caller → `AuthorizationDenied`
//! 3. registry lookup → `UnknownMode`
//! 4. role check → `AuthorizationDenied`
//! 5. input schema → `InvalidPayload`
//!
//! No job exists after a failure in any of these steps, and each request
//! leaves exactly one audit record. Admitted jobs are executed either on a
//! spawned task ([`JobOrchestrator::run`]) or in the caller's task
//! ([`JobOrchestrator::run_sync`]).

mod job;
mod retry;
mod store;

pub use job::{Job, JobError, JobErrorKind, JobState, TransitionError};
pub use retry::{backoff_delay, jittered_backoff};
pub use store::{InMemoryJobStore, JobStore};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cee_core::metrics::{
    DISPATCH_REQUESTS_TOTAL, JOB_DURATION_SECONDS, JOB_RETRIES_TOTAL, JOBS_ACTIVE,
    JOBS_FINISHED_TOTAL,
};
use cee_core::text::summarize;
use cee_core::{Caller, JobId, Mode, RequestId};
use cee_settings::{OrchestratorSettings, RetrySettings};
use dashmap::DashMap;
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditDecision, AuditOutcome, AuditRecord, AuditTrail};
use crate::errors::DispatchError;
use crate::gate::{AuthorizationGate, Decision, DenyReason};
use crate::registry::{AgentCapability, AgentError, AgentRegistry, JobContext};

/// Orchestrator tuning.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Bound on a synchronous dispatch, queue wait included.
    pub sync_timeout: Duration,
    /// Bound on one asynchronous execution, measured from `Running`.
    pub async_timeout: Duration,
    /// Handlers allowed to run at once.
    pub max_concurrent_jobs: usize,
    /// Maximum length of a summarized agent error.
    pub error_summary_bytes: usize,
    /// Backoff for idempotent capabilities.
    pub retry: RetrySettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

impl From<&OrchestratorSettings> for OrchestratorConfig {
    fn from(s: &OrchestratorSettings) -> Self {
        Self {
            sync_timeout: s.sync_timeout(),
            async_timeout: s.async_timeout(),
            max_concurrent_jobs: s.max_concurrent_jobs.max(1),
            error_summary_bytes: s.error_summary_bytes,
            retry: s.retry.clone(),
        }
    }
}

/// Live job: the record plus its stop signal.
struct JobCell {
    job: Mutex<Job>,
    cancel: CancellationToken,
}

struct Admitted {
    capability: Arc<AgentCapability>,
    cell: Arc<JobCell>,
    job_id: JobId,
}

/// How long execution may take.
#[derive(Clone, Copy)]
enum Bound {
    /// From admission, including time spent queued.
    Total(Duration),
    /// From the moment the handler starts.
    Execution(Duration),
}

impl Bound {
    fn duration(self) -> Duration {
        match self {
            Self::Total(d) | Self::Execution(d) => d,
        }
    }
}

/// Settles a job whose executing future was dropped before it finished,
/// e.g. a synchronous caller that disconnected.
struct AbandonGuard<'a> {
    orchestrator: &'a JobOrchestrator,
    cell: Arc<JobCell>,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        let terminal = self.cell.job.lock().state.is_terminal();
        if terminal {
            return;
        }
        self.cell.cancel.cancel();
        let error = JobError {
            kind: JobErrorKind::Cancelled,
            message: "caller went away".to_string(),
        };
        if self
            .orchestrator
            .settle(&self.cell, JobState::Cancelled, None, Some(error))
        {
            warn!("job abandoned before it finished");
        }
    }
}

enum Failure {
    Agent(String),
    Timeout,
    Cancelled,
}

/// Admits, executes, and tracks jobs.
pub struct JobOrchestrator {
    registry: Arc<AgentRegistry>,
    gate: AuthorizationGate,
    audit: AuditTrail,
    store: Arc<dyn JobStore>,
    live: DashMap<JobId, Arc<JobCell>>,
    permits: Arc<Semaphore>,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

impl JobOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        registry: Arc<AgentRegistry>,
        audit: AuditTrail,
        store: Arc<dyn JobStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            gate: AuthorizationGate::new(),
            audit,
            store,
            live: DashMap::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// The registry jobs are dispatched through.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// The audit trail.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Current configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Admit a job and execute it in the background.
    ///
    /// Returns once the job is `Queued`; never waits for the agent.
    #[instrument(skip(self, mode, payload, caller), fields(mode = %mode, user_id = caller.audit_user_id()))]
    pub fn run(
        self: &Arc<Self>,
        mode: Mode,
        payload: Value,
        caller: &Caller,
    ) -> Result<JobId, DispatchError> {
        let admitted = self.admit(mode, payload, caller)?;
        let job_id = admitted.job_id.clone();
        let this = Arc::clone(self);
        let bound = Bound::Execution(self.config.async_timeout);
        drop(tokio::spawn(async move {
            let _ = this.execute(admitted, bound).await;
        }));
        Ok(job_id)
    }

    /// Admit a job and execute it in the caller's task, bounded by `sync_timeout`.
    #[instrument(skip(self, mode, payload, caller), fields(mode = %mode, user_id = caller.audit_user_id()))]
    pub async fn run_sync(
        &self,
        mode: Mode,
        payload: Value,
        caller: &Caller,
    ) -> Result<Value, DispatchError> {
        let admitted = self.admit(mode, payload, caller)?;
        self.execute(admitted, Bound::Total(self.config.sync_timeout))
            .await
    }

    /// Request cancellation of a job. Owner or admin only.
    ///
    /// A queued job is cancelled immediately; a running job is signalled and
    /// settles when its handler yields. Returns the job's state afterwards.
    #[instrument(skip(self, job_id, caller), fields(job_id = %job_id))]
    pub fn cancel(&self, job_id: &JobId, caller: &Caller) -> Result<JobState, DispatchError> {
        let Some(cell) = self.live.get(job_id).map(|e| Arc::clone(e.value())) else {
            let job = self
                .store
                .get(job_id)
                .ok_or_else(|| DispatchError::JobNotFound(job_id.clone()))?;
            Self::check_owner(&job, caller)?;
            return Ok(job.state);
        };

        let snapshot = cell.job.lock().clone();
        Self::check_owner(&snapshot, caller)?;

        if snapshot.state == JobState::Queued {
            let error = JobError {
                kind: JobErrorKind::Cancelled,
                message: format!("cancelled by {}", caller.audit_user_id()),
            };
            let _ = self.settle(&cell, JobState::Cancelled, None, Some(error));
        }
        cell.cancel.cancel();
        info!(user_id = caller.audit_user_id(), "cancellation requested");
        let state = cell.job.lock().state;
        Ok(state)
    }

    /// Latest snapshot of a job.
    pub fn job(&self, job_id: &JobId) -> Option<Job> {
        if let Some(cell) = self.live.get(job_id).map(|e| Arc::clone(e.value())) {
            let job = cell.job.lock().clone();
            return Some(job);
        }
        self.store.get(job_id)
    }

    /// Job snapshot, visible to its owner and to admins.
    pub fn job_for(&self, job_id: &JobId, caller: &Caller) -> Result<Job, DispatchError> {
        let job = self
            .job(job_id)
            .ok_or_else(|| DispatchError::JobNotFound(job_id.clone()))?;
        Self::check_owner(&job, caller)?;
        Ok(job)
    }

    /// Jobs not yet in a terminal state.
    pub fn active_job_count(&self) -> usize {
        self.live.len()
    }

    /// Stop admitting work, cancel every live job, and wait up to `grace`
    /// for them to settle. Pending audit writes are flushed.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, grace: Duration) {
        info!(active = self.live.len(), "orchestrator shutdown initiated");
        self.shutdown.cancel();
        let deadline = Instant::now() + grace;
        while !self.live.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if !self.live.is_empty() {
            warn!(remaining = self.live.len(), "jobs still live after shutdown grace");
        }
        self.audit.flush().await;
    }

    /// Record a request whose body could not be decoded.
    ///
    /// Nothing is admitted; the request still leaves its one audit record.
    pub fn reject_malformed(&self, mode: Mode, caller: &Caller, detail: &str) {
        self.reject(
            RequestId::generate(),
            caller.audit_user_id(),
            mode,
            AuditDecision::Malformed,
            detail,
        );
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ── admission ───────────────────────────────────────────────────────

    fn admit(&self, mode: Mode, payload: Value, caller: &Caller) -> Result<Admitted, DispatchError> {
        let request_id = RequestId::generate();
        let user_id = caller.audit_user_id();

        if self.shutdown.is_cancelled() {
            self.reject(request_id, user_id, mode, AuditDecision::Denied, "shutting down");
            return Err(DispatchError::ShuttingDown);
        }

        let Some(principal) = caller.principal() else {
            let reason = DenyReason::Unauthenticated;
            self.reject(request_id, user_id, mode, AuditDecision::Denied, &reason.to_string());
            return Err(DispatchError::AuthorizationDenied { reason });
        };

        let Some(capability) = self.registry.lookup(mode) else {
            self.reject(
                request_id,
                user_id,
                mode,
                AuditDecision::UnknownMode,
                "no capability registered",
            );
            return Err(DispatchError::UnknownMode(mode));
        };

        if let Decision::Denied(reason) = self.gate.authorize(caller, &capability.required_roles) {
            self.reject(request_id, user_id, mode, AuditDecision::Denied, &reason.to_string());
            return Err(DispatchError::AuthorizationDenied { reason });
        }

        if let Err(violation) = capability.input_schema.validate(&payload) {
            self.reject(request_id, user_id, mode, AuditDecision::Authorized, &violation);
            return Err(DispatchError::InvalidPayload(violation));
        }

        let mut job = Job::new(request_id.clone(), mode, principal.user_id.clone(), payload);
        let job_id = job.id.clone();
        if let Err(e) = job.transition(JobState::Queued) {
            // Created → Queued is always legal on a fresh job.
            warn!(error = %e, "unexpected transition failure at admission");
        }

        self.audit.append(
            AuditRecord::new(
                request_id,
                user_id,
                mode,
                AuditDecision::Authorized,
                AuditOutcome::Pending,
            )
            .with_job(job_id.clone()),
        );
        counter!(DISPATCH_REQUESTS_TOTAL, "mode" => mode.as_str(), "decision" => "authorized")
            .increment(1);

        self.store.put(job.clone());
        let cell = Arc::new(JobCell {
            job: Mutex::new(job),
            cancel: self.shutdown.child_token(),
        });
        let _ = self.live.insert(job_id.clone(), Arc::clone(&cell));
        gauge!(JOBS_ACTIVE).set(self.live.len() as f64);
        debug!(job_id = %job_id, "job queued");

        Ok(Admitted {
            capability,
            cell,
            job_id,
        })
    }

    fn reject(
        &self,
        request_id: RequestId,
        user_id: &str,
        mode: Mode,
        decision: AuditDecision,
        detail: &str,
    ) {
        info!(%mode, user_id, decision = decision.as_str(), detail, "dispatch rejected");
        counter!(DISPATCH_REQUESTS_TOTAL, "mode" => mode.as_str(), "decision" => decision.as_str())
            .increment(1);
        self.audit.append(
            AuditRecord::new(request_id, user_id, mode, decision, AuditOutcome::Failed)
                .with_detail(detail),
        );
    }

    fn check_owner(job: &Job, caller: &Caller) -> Result<(), DispatchError> {
        let Some(principal) = caller.principal() else {
            return Err(DispatchError::AuthorizationDenied {
                reason: DenyReason::Unauthenticated,
            });
        };
        if principal.user_id == job.owner || principal.role.is_admin() {
            Ok(())
        } else {
            Err(DispatchError::AuthorizationDenied {
                reason: DenyReason::NotJobOwner,
            })
        }
    }

    // ── execution ───────────────────────────────────────────────────────

    async fn execute(&self, admitted: Admitted, bound: Bound) -> Result<Value, DispatchError> {
        let Admitted {
            capability,
            cell,
            job_id,
        } = admitted;
        let _abandon = AbandonGuard {
            orchestrator: self,
            cell: Arc::clone(&cell),
        };

        let work = self.acquire_and_invoke(&capability, &cell, bound);
        let outcome = tokio::select! {
            biased;
            r = work => r,
            () = cell.cancel.cancelled() => Err(Failure::Cancelled),
        };

        match outcome {
            Ok(value) => {
                let _ = self.settle(&cell, JobState::Completed, Some(value.clone()), None);
                Ok(value)
            }
            Err(Failure::Agent(message)) => {
                let message = summarize(&message, self.config.error_summary_bytes);
                let error = JobError {
                    kind: JobErrorKind::AgentExecution,
                    message: message.clone(),
                };
                let _ = self.settle(&cell, JobState::Failed, None, Some(error));
                Err(DispatchError::AgentExecution { job_id, message })
            }
            Err(Failure::Timeout) => {
                cell.cancel.cancel();
                let after = bound.duration();
                let error = JobError {
                    kind: JobErrorKind::Timeout,
                    message: format!("timed out after {}ms", after.as_millis()),
                };
                // Never ran, so it cannot have failed.
                let queued = cell.job.lock().state == JobState::Queued;
                let terminal = if queued {
                    JobState::Cancelled
                } else {
                    JobState::Failed
                };
                let _ = self.settle(&cell, terminal, None, Some(error));
                Err(DispatchError::Timeout { job_id, after })
            }
            Err(Failure::Cancelled) => {
                let (kind, message) = if self.shutdown.is_cancelled() {
                    (JobErrorKind::Shutdown, "orchestrator shut down")
                } else {
                    (JobErrorKind::Cancelled, "cancelled")
                };
                let error = JobError {
                    kind,
                    message: message.to_string(),
                };
                let _ = self.settle(&cell, JobState::Cancelled, None, Some(error));
                Err(DispatchError::Cancelled { job_id })
            }
        }
    }

    async fn acquire_and_invoke(
        &self,
        capability: &AgentCapability,
        cell: &JobCell,
        bound: Bound,
    ) -> Result<Value, Failure> {
        let run = async {
            let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
                return Err(Failure::Cancelled);
            };
            if !self.mark_running(cell) {
                return Err(Failure::Cancelled);
            }
            match bound {
                Bound::Execution(limit) => {
                    tokio::time::timeout(limit, self.invoke_with_retry(capability, cell))
                        .await
                        .unwrap_or(Err(Failure::Timeout))
                }
                Bound::Total(_) => self.invoke_with_retry(capability, cell).await,
            }
        };
        match bound {
            Bound::Total(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(Failure::Timeout)),
            Bound::Execution(_) => run.await,
        }
    }

    fn mark_running(&self, cell: &JobCell) -> bool {
        let mut job = cell.job.lock();
        if job.transition(JobState::Running).is_err() {
            return false;
        }
        // Under the job lock so snapshots reach the store in transition order.
        self.store.put(job.clone());
        true
    }

    async fn invoke_with_retry(
        &self,
        capability: &AgentCapability,
        cell: &JobCell,
    ) -> Result<Value, Failure> {
        let max_attempts = capability
            .retry
            .max_attempts()
            .min(self.config.retry.max_attempts.max(1));
        let mut retry = 0u32;
        loop {
            let (payload, ctx) = {
                let mut job = cell.job.lock();
                job.attempts += 1;
                let ctx = JobContext::new(
                    job.id.clone(),
                    job.mode,
                    job.owner.clone(),
                    job.attempts,
                    cell.cancel.child_token(),
                );
                (job.payload.clone(), ctx)
            };
            let attempt = ctx.attempt;

            let result = AssertUnwindSafe(capability.handler.execute(payload, ctx))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(AgentError::Cancelled)) => return Err(Failure::Cancelled),
                Ok(Err(e)) if e.is_retryable() && attempt < max_attempts => {
                    let delay = jittered_backoff(retry, &self.config.retry);
                    warn!(
                        mode = %capability.mode,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retryable agent failure"
                    );
                    counter!(JOB_RETRIES_TOTAL, "mode" => capability.mode.as_str()).increment(1);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cell.cancel.cancelled() => return Err(Failure::Cancelled),
                    }
                    retry += 1;
                }
                Ok(Err(e)) => return Err(Failure::Agent(e.to_string())),
                Err(panic) => {
                    return Err(Failure::Agent(format!(
                        "agent panicked: {}",
                        panic_message(panic.as_ref())
                    )));
                }
            }
        }
    }

    /// Move a live job to a terminal state exactly once.
    ///
    /// Returns `false` if the job was already terminal.
    fn settle(
        &self,
        cell: &JobCell,
        state: JobState,
        result: Option<Value>,
        error: Option<JobError>,
    ) -> bool {
        let snapshot = {
            let mut job = cell.job.lock();
            let moved = match (result, error) {
                (Some(value), _) => job.complete(value),
                (None, Some(error)) => job.fail(state, error),
                (None, None) => job.transition(state),
            };
            if moved.is_err() {
                return false;
            }
            self.store.put(job.clone());
            job.clone()
        };

        let outcome = match snapshot.state {
            JobState::Completed => AuditOutcome::Completed,
            JobState::Cancelled => AuditOutcome::Cancelled,
            _ => AuditOutcome::Failed,
        };
        let detail = snapshot.error.as_ref().map(|e| e.message.clone());
        self.audit
            .record_outcome(snapshot.request_id.clone(), outcome, detail);

        counter!(JOBS_FINISHED_TOTAL, "mode" => snapshot.mode.as_str(), "state" => snapshot.state.as_str())
            .increment(1);
        if let Some(d) = snapshot.run_duration() {
            histogram!(JOB_DURATION_SECONDS, "mode" => snapshot.mode.as_str()).record(d.as_secs_f64());
        }
        info!(
            job_id = %snapshot.id,
            mode = %snapshot.mode,
            state = %snapshot.state,
            attempts = snapshot.attempts,
            "job settled"
        );

        // A job leaving `live` is already stored and audited.
        let _ = self.live.remove(&snapshot.id);
        gauge!(JOBS_ACTIVE).set(self.live.len() as f64);
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::gate::RequiredRoles;
    use crate::registry::{AgentHandler, FieldKind, InputSchema, RetryPolicy};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Echo;

    #[async_trait]
    impl AgentHandler for Echo {
        async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, AgentError> {
            Ok(json!({"echo": payload, "attempt": ctx.attempt}))
        }
    }

    struct Sleepy(Duration);

    #[async_trait]
    impl AgentHandler for Sleepy {
        async fn execute(&self, _payload: Value, _ctx: JobContext) -> Result<Value, AgentError> {
            tokio::time::sleep(self.0).await;
            Ok(json!({"slept": true}))
        }
    }

    struct Flaky {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl AgentHandler for Flaky {
        async fn execute(&self, _payload: Value, _ctx: JobContext) -> Result<Value, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                Err(AgentError::Unavailable(format!("attempt {n}")))
            } else {
                Ok(json!({"calls": n}))
            }
        }
    }

    struct Panicky;

    #[async_trait]
    impl AgentHandler for Panicky {
        async fn execute(&self, _payload: Value, _ctx: JobContext) -> Result<Value, AgentError> {
            panic!("model exploded");
        }
    }

    struct Harness {
        orch: Arc<JobOrchestrator>,
        sink: Arc<InMemoryAuditSink>,
    }

    fn harness(handlers: Vec<(Mode, Arc<dyn AgentHandler>, RetryPolicy)>, config: OrchestratorConfig) -> Harness {
        let registry = Arc::new(AgentRegistry::new());
        for (mode, handler, retry) in handlers {
            let cap = AgentCapability::new(
                mode,
                RequiredRoles::new(["admin", "analyst"]).unwrap(),
                handler,
            )
            .with_schema(InputSchema::any_object().optional("text", FieldKind::String))
            .with_retry(retry);
            let _ = registry.register(cap).unwrap();
        }
        registry.seal();
        let sink = Arc::new(InMemoryAuditSink::new());
        let audit = AuditTrail::spawn(sink.clone());
        let orch = Arc::new(JobOrchestrator::new(
            registry,
            audit,
            Arc::new(InMemoryJobStore::new()),
            config,
        ));
        Harness { orch, sink }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            sync_timeout: Duration::from_secs(5),
            async_timeout: Duration::from_secs(5),
            max_concurrent_jobs: 8,
            error_summary_bytes: 64,
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
        }
    }

    fn analyst() -> Caller {
        Caller::user("ana", "analyst")
    }

    async fn wait_terminal(orch: &JobOrchestrator, id: &JobId) -> Job {
        for _ in 0..500 {
            let job = orch.job(id).unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never settled");
    }

    #[tokio::test]
    async fn sync_dispatch_returns_result() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        let out = h
            .orch
            .run_sync(Mode::SimulationRun, json!({"text": "hi"}), &analyst())
            .await
            .unwrap();
        assert_eq!(out["echo"]["text"], "hi");
        assert_eq!(h.orch.active_job_count(), 0);

        h.orch.audit().flush().await;
        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, AuditDecision::Authorized);
        assert_eq!(records[0].outcome, AuditOutcome::Completed);
    }

    #[tokio::test]
    async fn async_dispatch_completes_in_background() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        let id = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        let job = wait_terminal(&h.orch, &id).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(
            job.history,
            vec![
                JobState::Created,
                JobState::Queued,
                JobState::Running,
                JobState::Completed
            ]
        );
        assert_eq!(job.owner, "ana");
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn anonymous_is_denied_before_lookup() {
        let h = harness(vec![], config());
        let err = h
            .orch
            .run_sync(Mode::Unknown, json!({}), &Caller::Anonymous)
            .await
            .unwrap_err();
        assert!(err.is_unauthenticated());
        h.orch.audit().flush().await;
        assert_eq!(h.sink.records()[0].decision, AuditDecision::Denied);
    }

    #[tokio::test]
    async fn unregistered_mode_is_unknown_mode_without_job() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        let err = h
            .orch
            .run(Mode::GovernanceCheck, json!({}), &analyst())
            .unwrap_err();
        assert_matches!(err, DispatchError::UnknownMode(Mode::GovernanceCheck));
        assert_eq!(h.orch.active_job_count(), 0);
        h.orch.audit().flush().await;
        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, AuditDecision::UnknownMode);
        assert!(records[0].job_id.is_none());
    }

    #[tokio::test]
    async fn wrong_role_is_denied() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        let err = h
            .orch
            .run(Mode::SimulationRun, json!({}), &Caller::user("g", "guest"))
            .unwrap_err();
        assert_matches!(
            err,
            DispatchError::AuthorizationDenied {
                reason: DenyReason::RoleNotPermitted { .. }
            }
        );
    }

    #[tokio::test]
    async fn schema_violation_is_invalid_payload() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        let err = h
            .orch
            .run_sync(Mode::SimulationRun, json!({"text": 42}), &analyst())
            .await
            .unwrap_err();
        assert_matches!(err, DispatchError::InvalidPayload(msg) if msg.contains("text"));
        h.orch.audit().flush().await;
        let rec = &h.sink.records()[0];
        assert_eq!(rec.decision, AuditDecision::Authorized);
        assert_eq!(rec.outcome, AuditOutcome::Failed);
    }

    #[tokio::test]
    async fn sync_timeout_fails_job() {
        let mut cfg = config();
        cfg.sync_timeout = Duration::from_millis(50);
        let h = harness(
            vec![(Mode::SimulationRun, Arc::new(Sleepy(Duration::from_secs(10))), RetryPolicy::Never)],
            cfg,
        );
        let err = h
            .orch
            .run_sync(Mode::SimulationRun, json!({}), &analyst())
            .await
            .unwrap_err();
        let DispatchError::Timeout { job_id, .. } = err else {
            panic!("expected timeout, got {err:?}");
        };
        let job = h.orch.job(&job_id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.unwrap().kind, JobErrorKind::Timeout);
    }

    #[tokio::test]
    async fn sync_timeout_while_queued_cancels_without_running() {
        let mut cfg = config();
        cfg.max_concurrent_jobs = 1;
        cfg.sync_timeout = Duration::from_millis(100);
        let h = harness(
            vec![(Mode::SimulationRun, Arc::new(Sleepy(Duration::from_secs(30))), RetryPolicy::Never)],
            cfg,
        );
        let holder = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        while h.orch.job(&holder).unwrap().state != JobState::Running {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let err = h
            .orch
            .run_sync(Mode::SimulationRun, json!({}), &analyst())
            .await
            .unwrap_err();
        let DispatchError::Timeout { job_id, .. } = err else {
            panic!("expected timeout, got {err:?}");
        };
        let job = h.orch.job(&job_id).unwrap();
        assert_eq!(
            job.history,
            vec![JobState::Created, JobState::Queued, JobState::Cancelled]
        );
        assert_eq!(job.error.unwrap().kind, JobErrorKind::Timeout);
        assert!(job.started_at.is_none());

        let _ = h.orch.cancel(&holder, &analyst()).unwrap();
        let _ = wait_terminal(&h.orch, &holder).await;
        h.orch.audit().flush().await;
        let timed_out = h
            .sink
            .records()
            .into_iter()
            .find(|r| r.job_id.as_ref() == Some(&job_id))
            .unwrap();
        assert_eq!(timed_out.outcome, AuditOutcome::Cancelled);
    }

    #[tokio::test]
    async fn dropped_sync_caller_cancels_its_job() {
        let h = harness(
            vec![(Mode::SimulationRun, Arc::new(Sleepy(Duration::from_secs(1))), RetryPolicy::Never)],
            config(),
        );
        let orch = Arc::clone(&h.orch);
        let request = tokio::spawn(async move {
            orch.run_sync(Mode::SimulationRun, json!({}), &analyst())
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.orch.active_job_count(), 1);
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        assert_eq!(h.orch.active_job_count(), 0);
        h.orch.audit().flush().await;
        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Cancelled);

        let job = h.orch.job(records[0].job_id.as_ref().unwrap()).unwrap();
        assert_eq!(
            job.history,
            vec![
                JobState::Created,
                JobState::Queued,
                JobState::Running,
                JobState::Cancelled
            ]
        );
        assert_eq!(job.error.unwrap().kind, JobErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn panics_are_captured_as_failures() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Panicky), RetryPolicy::Never)], config());
        let err = h
            .orch
            .run_sync(Mode::SimulationRun, json!({}), &analyst())
            .await
            .unwrap_err();
        assert_matches!(err, DispatchError::AgentExecution { ref message, .. } if message.contains("model exploded"));
    }

    #[tokio::test]
    async fn idempotent_capability_retries_transient_errors() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 2,
        });
        let h = harness(
            vec![(
                Mode::SimulationRun,
                flaky.clone(),
                RetryPolicy::Idempotent { max_attempts: 3 },
            )],
            config(),
        );
        let out = h
            .orch
            .run_sync(Mode::SimulationRun, json!({}), &analyst())
            .await
            .unwrap();
        assert_eq!(out["calls"], 3);
    }

    #[tokio::test]
    async fn non_idempotent_capability_runs_once() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_times: 1,
        });
        let h = harness(vec![(Mode::SimulationRun, flaky.clone(), RetryPolicy::Never)], config());
        let err = h
            .orch
            .run_sync(Mode::SimulationRun, json!({}), &analyst())
            .await
            .unwrap_err();
        assert_matches!(err, DispatchError::AgentExecution { .. });
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_messages_are_summarized() {
        struct Loud;
        #[async_trait]
        impl AgentHandler for Loud {
            async fn execute(&self, _p: Value, _c: JobContext) -> Result<Value, AgentError> {
                Err(AgentError::Failed("é".repeat(500)))
            }
        }
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Loud), RetryPolicy::Never)], config());
        let err = h
            .orch
            .run_sync(Mode::SimulationRun, json!({}), &analyst())
            .await
            .unwrap_err();
        let DispatchError::AgentExecution { message, .. } = err else {
            panic!("expected agent error");
        };
        assert!(message.len() <= 64);
    }

    #[tokio::test]
    async fn running_job_can_be_cancelled_by_owner() {
        let h = harness(
            vec![(Mode::SimulationRun, Arc::new(Sleepy(Duration::from_secs(30))), RetryPolicy::Never)],
            config(),
        );
        let id = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        while h.orch.job(&id).unwrap().state != JobState::Running {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let other = Caller::user("mallory", "analyst");
        assert_matches!(
            h.orch.cancel(&id, &other),
            Err(DispatchError::AuthorizationDenied {
                reason: DenyReason::NotJobOwner
            })
        );

        let _ = h.orch.cancel(&id, &analyst()).unwrap();
        let job = wait_terminal(&h.orch, &id).await;
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(
            job.history,
            vec![
                JobState::Created,
                JobState::Queued,
                JobState::Running,
                JobState::Cancelled
            ]
        );
        h.orch.audit().flush().await;
        assert_eq!(h.sink.records()[0].outcome, AuditOutcome::Cancelled);
    }

    #[tokio::test]
    async fn queued_job_is_cancelled_immediately() {
        let mut cfg = config();
        cfg.max_concurrent_jobs = 1;
        let h = harness(
            vec![(Mode::SimulationRun, Arc::new(Sleepy(Duration::from_secs(30))), RetryPolicy::Never)],
            cfg,
        );
        let first = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        while h.orch.job(&first).unwrap().state != JobState::Running {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let second = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        assert_eq!(h.orch.job(&second).unwrap().state, JobState::Queued);

        let admin = Caller::user("root", "admin");
        assert_eq!(h.orch.cancel(&second, &admin).unwrap(), JobState::Cancelled);
        assert_eq!(
            h.orch.job(&second).unwrap().history,
            vec![JobState::Created, JobState::Queued, JobState::Cancelled]
        );
        let _ = h.orch.cancel(&first, &admin).unwrap();
        let _ = wait_terminal(&h.orch, &first).await;
    }

    #[tokio::test]
    async fn cancel_unknown_job_is_not_found() {
        let h = harness(vec![], config());
        assert_matches!(
            h.orch.cancel(&JobId::generate(), &analyst()),
            Err(DispatchError::JobNotFound(_))
        );
    }

    #[tokio::test]
    async fn job_visibility_is_owner_or_admin() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        let id = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        assert!(h.orch.job_for(&id, &analyst()).is_ok());
        assert!(h.orch.job_for(&id, &Caller::user("root", "admin")).is_ok());
        assert!(h.orch.job_for(&id, &Caller::user("eve", "analyst")).is_err());
    }

    #[tokio::test]
    async fn shutdown_cancels_live_jobs_and_rejects_new_work() {
        let h = harness(
            vec![(Mode::SimulationRun, Arc::new(Sleepy(Duration::from_secs(30))), RetryPolicy::Never)],
            config(),
        );
        let id = h.orch.run(Mode::SimulationRun, json!({}), &analyst()).unwrap();
        h.orch.shutdown(Duration::from_secs(2)).await;

        let job = h.orch.job(&id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.error.unwrap().kind, JobErrorKind::Shutdown);
        assert_matches!(
            h.orch.run(Mode::SimulationRun, json!({}), &analyst()),
            Err(DispatchError::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn malformed_request_is_audited_without_a_job() {
        let h = harness(vec![(Mode::SimulationRun, Arc::new(Echo), RetryPolicy::Never)], config());
        h.orch
            .reject_malformed(Mode::SimulationRun, &analyst(), "expected value at line 1");
        assert_eq!(h.orch.active_job_count(), 0);
        h.orch.audit().flush().await;
        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, AuditDecision::Malformed);
        assert_eq!(records[0].outcome, AuditOutcome::Failed);
        assert_eq!(records[0].user_id, "ana");
        assert!(records[0].job_id.is_none());
    }

    #[test]
    fn panic_message_extracts_text() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
