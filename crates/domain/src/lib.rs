//! # autoflow-domain
//!
//! Pure domain model for the autoflow automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Events** (inbound domain events with dedup keys, outbound notices)
//! - Define **Rules** (trigger → condition → action mappings)
//! - Define **Workflow templates** (sequential, parallel and conditional step graphs)
//! - Define **Execution runs** (ledgered invocations and their step results)
//! - Define **Schedules** (cron expressions for time-based triggers)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod event;
pub mod rule;
pub mod run;
pub mod schedule;
pub mod workflow;
