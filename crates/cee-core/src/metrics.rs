//! Metric name constants, shared so the runtime and the server never drift.

/// Dispatch requests total (counter, labels: mode, decision).
pub const DISPATCH_REQUESTS_TOTAL: &str = "dispatch_requests_total";
/// Jobs reaching a terminal state (counter, labels: mode, state).
pub const JOBS_FINISHED_TOTAL: &str = "jobs_finished_total";
/// Jobs currently queued or running (gauge).
pub const JOBS_ACTIVE: &str = "jobs_active";
/// Handler wall time per job (histogram, labels: mode).
pub const JOB_DURATION_SECONDS: &str = "job_duration_seconds";
/// Handler retries (counter, labels: mode).
pub const JOB_RETRIES_TOTAL: &str = "job_retries_total";
/// Audit writes that the sink rejected (counter).
pub const AUDIT_WRITE_FAILURES_TOTAL: &str = "audit_write_failures_total";
/// HTTP requests (counter, labels: route, status).
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Every metric name, for exhaustiveness checks.
pub const ALL: [&str; 7] = [
    DISPATCH_REQUESTS_TOTAL,
    JOBS_FINISHED_TOTAL,
    JOBS_ACTIVE,
    JOB_DURATION_SECONDS,
    JOB_RETRIES_TOTAL,
    AUDIT_WRITE_FAILURES_TOTAL,
    HTTP_REQUESTS_TOTAL,
];
