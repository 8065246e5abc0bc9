//! HTTP error mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cee_runtime::DispatchError;
use serde_json::json;
use tracing::warn;

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Dispatch or job-control failure.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Body could not be read or parsed.
    #[error("{message}")]
    Body {
        /// Status chosen by the extractor (400, 413, 415, 422).
        status: StatusCode,
        /// Extractor message.
        message: String,
    },
    /// Feature not available in this process.
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Dispatch(e) => dispatch_status(e),
            Self::Body { status, .. } => *status,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable error code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Dispatch(e) => e.category(),
            Self::Body { .. } => "bad_request",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Status code for a dispatch error.
pub fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::AuthorizationDenied { .. } if err.is_unauthenticated() => {
            StatusCode::UNAUTHORIZED
        }
        DispatchError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
        DispatchError::UnknownMode(_) => StatusCode::BAD_REQUEST,
        DispatchError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::AgentExecution { .. } => StatusCode::BAD_GATEWAY,
        DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Cancelled { .. } => StatusCode::CONFLICT,
        DispatchError::JobNotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }
        let mut body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        if let Self::Dispatch(e) = &self
            && let Some(job_id) = e.job_id()
        {
            body["error"]["jobId"] = json!(job_id);
        }
        (status, Json(body)).into_response()
    }
}
