//! Scheduling and execution logic for cronflow.
//!
//! This crate defines the "ports" (the job repository and node backend
//! traits) that the infrastructure layer implements, plus the algorithms
//! built on them: cron evaluation, wave compilation, the wave executor and
//! the scheduler. It depends only on `cronflow-types` -- never on
//! `cronflow-infra` or any filesystem/process code.

pub mod cron;
pub mod event;
pub mod repository;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
