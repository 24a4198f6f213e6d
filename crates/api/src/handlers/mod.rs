//! Request handlers and the shared application state.

use engine::WorkflowEngine;
use queue::DeferredScheduler;

pub mod logs;
pub mod runs;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: WorkflowEngine,
    pub scheduler: DeferredScheduler,
}

impl AppState {
    pub fn new(engine: WorkflowEngine, scheduler: DeferredScheduler) -> Self {
        Self { engine, scheduler }
    }
}
