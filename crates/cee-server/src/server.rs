//! `CeeServer`: the axum listener around an [`Engine`].

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use cee_runtime::Engine;
use cee_settings::ServerSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::TokenService;
use crate::metrics::track_requests;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Routing and dispatch.
    pub engine: Arc<Engine>,
    /// Bearer-token verifier. `None` leaves every caller anonymous.
    pub tokens: Option<Arc<TokenService>>,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// The HTTP server.
pub struct CeeServer {
    settings: ServerSettings,
    state: AppState,
}

impl CeeServer {
    /// Create a new server.
    pub fn new(
        settings: ServerSettings,
        engine: Arc<Engine>,
        tokens: Option<Arc<TokenService>>,
    ) -> Self {
        Self {
            settings,
            state: AppState {
                engine,
                tokens,
                metrics: None,
                shutdown: Arc::new(ShutdownCoordinator::new()),
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        routes::router()
            .route_layer(middleware::from_fn(track_requests))
            .layer(RequestBodyLimitLayer::new(self.settings.body_limit_bytes))
            .layer(TimeoutLayer::new(Duration::from_millis(
                self.settings.request_timeout_ms,
            )))
            .layer(CatchPanicLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Serve until the shutdown coordinator fires.
    ///
    /// Live jobs are cancelled and the audit trail flushed before the
    /// listener stops accepting connections.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let router = self.router();
        let token = self.state.shutdown.token();
        let engine = Arc::clone(&self.state.engine);
        let grace = Duration::from_millis(self.settings.shutdown_grace_ms);

        info!(addr = ?listener.local_addr().ok(), "cee server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                engine.shutdown(grace).await;
            })
            .await?;
        info!("cee server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server() -> CeeServer {
        let engine = Engine::builder().build().unwrap();
        CeeServer::new(ServerSettings::default(), Arc::new(engine), None)
    }

    #[tokio::test]
    async fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.settings().port, 8000);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["activeJobs"], 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let engine = Engine::builder().build().unwrap();
        let settings = ServerSettings {
            body_limit_bytes: 16,
            ..ServerSettings::default()
        };
        let app = CeeServer::new(settings, Arc::new(engine), None).router();
        let req = Request::builder()
            .method("POST")
            .uri("/api/route")
            .header("content-type", "application/json")
            .body(Body::from(format!("{{\"text\":\"{}\"}}", "x".repeat(64))))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
