//! # cee-server
//!
//! Axum HTTP surface for the cognitive enterprise engine.
//!
//! - **Auth**: HS256 bearer tokens resolved to a [`Caller`](cee_core::Caller)
//! - **Routes**: `/api/route`, one endpoint per mode, job status and cancel
//! - **Errors**: [`ApiError`] maps dispatch failures to status codes
//! - **Metrics**: Prometheus exposition at `/metrics`
//! - **Shutdown**: signal-driven drain via [`ShutdownCoordinator`]
//!
//! ## Crate Position
//!
//! Depends on: cee-core, cee-settings, cee-runtime.
//! Depended on by: cee-engine.

#![deny(unsafe_code)]

pub mod auth;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use auth::{AuthError, CallerIdentity, Claims, TokenService};
pub use error::ApiError;
pub use server::{AppState, CeeServer};
pub use shutdown::ShutdownCoordinator;
