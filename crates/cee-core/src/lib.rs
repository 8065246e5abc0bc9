//! # cee-core
//!
//! Foundation types and utilities for the cee engine.
//!
//! This crate provides the shared vocabulary that all other cee crates depend on:
//!
//! - **Modes**: [`mode::Mode`], the closed set of processing modes a request can route to
//! - **Branded IDs**: [`ids::JobId`], [`ids::RequestId`] as newtypes
//! - **Identity**: [`identity::Caller`], [`identity::Principal`], [`identity::Role`]
//! - **Queries**: [`query::Query`], the immutable inbound request
//! - **Text**: char-boundary safe summarization for error messages
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//! - **Metrics**: metric name constants shared by the runtime and the server
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other cee crates.

#![deny(unsafe_code)]

pub mod identity;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod mode;
pub mod query;
pub mod text;

pub use identity::{Caller, Principal, Role};
pub use ids::{JobId, RequestId};
pub use mode::Mode;
pub use query::Query;
