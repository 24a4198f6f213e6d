//! `queue` crate: deferred execution of workflow runs.
//!
//! [`DeferredScheduler`] persists a run request with the time it becomes
//! due; [`Worker`] polls for due requests and hands them to the engine
//! exactly as a synchronous caller would.

pub mod error;
pub mod scheduler;
pub mod worker;

pub use error::QueueError;
pub use scheduler::{DeferredScheduler, ScheduleAck};
pub use worker::{Worker, WorkerConfig};
