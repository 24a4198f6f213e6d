//! `engine` crate: run models, graph ordering, the execution engine and
//! the per-run log.

pub mod dag;
pub mod error;
pub mod executor;
pub mod log_store;
pub mod models;
pub mod run_log;

pub use dag::{execution_order, StepGraph};
pub use error::{EngineError, LogError, RunFailure};
pub use executor::WorkflowEngine;
pub use models::{Edge, RunReport, RunRequest, RunStatus};
pub use log_store::{LogStore, MemoryLogStore, SqliteLogStore};
pub use run_log::{LogEntry, LogFollower, RunLog, RunLogConfig};

#[cfg(test)]
mod executor_tests;
