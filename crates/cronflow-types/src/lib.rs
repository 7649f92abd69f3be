//! Shared domain types for cronflow.
//!
//! This crate contains the types passed between the engine's layers: cron
//! jobs, workflow graphs, run records, run events, configuration, and the
//! error enums for storage and cron parsing.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod run;
pub mod workflow;
