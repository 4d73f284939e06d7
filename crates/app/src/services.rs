//! Application services — use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.
//! Mutations publish a realtime notice after they are persisted; notices are
//! best-effort and never fail the use-case.

pub mod rule_service;
pub mod workflow_service;
