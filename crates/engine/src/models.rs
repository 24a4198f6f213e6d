//! Core domain models for the workflow engine.
//!
//! `Step` and `ExecutionContext` live in the `nodes` crate so handlers can
//! use them without depending on the engine; they are re-exported here.
//! These types are also the JSON wire format of the API.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use nodes::{Credentials, ExecutionContext, Step, StepKind};

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge: `from` must execute before `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RunRequest
// ---------------------------------------------------------------------------

/// Everything needed to execute one run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default, alias = "id")]
    pub workflow_id: String,
    /// Caller-chosen run id, so an observer can attach to the log before
    /// the run is submitted. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(alias = "workflow")]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub credentials: Credentials,
}

impl RunRequest {
    /// Convenience constructor for testing.
    pub fn new(workflow_id: impl Into<String>, steps: Vec<Step>, edges: Vec<Edge>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: None,
            steps,
            edges,
            credentials: Credentials::default(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a run: `pending → running → {no_op | completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    /// The trigger found nothing to act on.
    NoOp,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::NoOp => write!(f, "no_op"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Outcome of a run as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    /// Step ids actually attempted, in order.
    pub execution_order: Vec<String>,
    pub context: ExecutionContext,
}
