//! Workflow engine: wave compilation, node dispatch and cron scheduling.
//!
//! - `dag` -- groups graph nodes into dependency waves (cycle-tolerant)
//! - `backend` -- collaborator ports for agent, loop and shell nodes
//! - `observer` -- run lifecycle callbacks
//! - `executor` -- runs one job's graph wave by wave and persists the run
//! - `scheduler` -- per-job timers, overlap prevention, shutdown drain

pub mod backend;
pub mod dag;
pub mod executor;
pub mod observer;
pub mod scheduler;

pub use backend::NodeBackends;
pub use dag::compile_waves;
pub use executor::{ExecutorError, WaveExecutor};
pub use observer::{NoopObserver, ObserverSet, RunObserver, TracingObserver};
pub use scheduler::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler, SchedulerError, TriggerOutcome};
