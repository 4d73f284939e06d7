//! # autoflow-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Accept inbound events (`POST /api/events`) and hand them to the
//!   event dispatcher without waiting for the rules they trigger
//! - Run rules and templates on demand and report their runs
//!   (`/api/rules/{id}/run`, `/api/workflows/{id}/run`, `/api/runs`)
//! - Manage rules and workflow templates (`/api/rules`, `/api/workflows`)
//! - Stream realtime notices as Server-Sent Events (`/api/notices/stream`)
//!
//! ## Dependency rule
//! Depends on `autoflow-app` (for port traits and services) and
//! `autoflow-domain` (for domain types used in request/response mapping).
//! Never leaks axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod test_support;
