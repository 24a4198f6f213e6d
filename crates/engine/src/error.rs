//! Engine-level error types.

use nodes::StepError;
use thiserror::Error;

use crate::models::RunReport;

/// Errors produced by the workflow engine (graph validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph errors (nothing has executed) ------

    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// An edge references a step ID that doesn't exist in the workflow.
    #[error("edge references unknown step '{step_id}' ({side} side)")]
    UnknownStepReference {
        step_id: String,
        side: &'static str,
    },

    /// The step graph is not a DAG.
    #[error("workflow graph contains a cycle: {}", steps.join(" -> "))]
    CycleDetected { steps: Vec<String> },

    // ------ Execution errors ------

    /// A handler failed; the rest of the run is abandoned.
    #[error("step '{step_id}' failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },
}

impl EngineError {
    /// The step a `StepFailed` error is attributed to.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

/// A failed run: the error plus everything the run produced before it.
#[derive(Debug, Error)]
#[error("run {} failed: {}", .report.run_id, .error)]
pub struct RunFailure {
    pub error: EngineError,
    pub report: RunReport,
}

/// Errors reading or writing the run log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("run log storage error: {0}")]
    Storage(#[from] db::DbError),
}
