//! Prometheus metrics recorder and `/metrics` rendering.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use cee_core::metrics::HTTP_REQUESTS_TOTAL;
use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global metrics recorder.
///
/// Call once at startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Count requests per matched route and status class.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    counter!(HTTP_REQUESTS_TOTAL, "route" => route, "status" => status).increment(1);
    response
}
