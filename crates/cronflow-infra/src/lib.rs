//! Infrastructure layer for cronflow.
//!
//! Contains implementations of the ports defined in `cronflow-core`: the
//! JSON-file job store, process-backed node backends, and the engine
//! configuration loader.

pub mod config;
pub mod filesystem;
pub mod process;
