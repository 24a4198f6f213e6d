//! Workflow execution engine.
//!
//! `WorkflowEngine` is the central orchestrator:
//! 1. Builds the step graph and produces the execution order.
//! 2. Iterates through steps in order, dispatching each via the
//!    `HandlerRegistry`.
//! 3. Records each step's output in the run's `ExecutionContext`.
//! 4. Writes every transition to the `RunLog`.
//! 5. Stops on the first handler error (`failed`) or on a trigger that
//!    found nothing (`no_op`).

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{is_empty_output, HandlerRegistry};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::dag::execution_order;
use crate::error::RunFailure;
use crate::models::{ExecutionContext, RunReport, RunRequest, RunStatus, Step};
use crate::run_log::RunLog;
use crate::EngineError;

/// Log line written when a trigger reports nothing new.
pub const NO_NEW_DATA: &str = "no new data";

/// Runs workflows against a fixed handler registry.
///
/// Cheap to clone; every clone shares the same registry and log. Runs are
/// independent of each other and may execute concurrently.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    registry: Arc<HandlerRegistry>,
    run_log: Arc<RunLog>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<HandlerRegistry>, run_log: Arc<RunLog>) -> Self {
        Self { registry, run_log }
    }

    pub fn run_log(&self) -> &Arc<RunLog> {
        &self.run_log
    }

    /// Run the workflow to a terminal state.
    ///
    /// Returns the report for `completed` and `no_op` runs.
    ///
    /// # Errors
    /// A [`RunFailure`] for graph errors (nothing executed) and for handler
    /// errors (context and attempted order up to the failing step).
    #[instrument(skip(self, request), fields(workflow_id = %request.workflow_id, run_id))]
    pub async fn submit(&self, request: RunRequest) -> Result<RunReport, RunFailure> {
        let run_id = request
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut report = RunReport {
            run_id,
            workflow_id: request.workflow_id.clone(),
            status: RunStatus::Pending,
            execution_order: Vec::new(),
            context: ExecutionContext::new(),
        };
        self.log(&report, "Workflow started.").await;

        // ------------------------------------------------------------------
        // Build the graph and order it. Nothing runs if either fails.
        // ------------------------------------------------------------------
        let order = match execution_order(&request.steps, &request.edges) {
            Ok(order) => order,
            Err(err) => return Err(self.fail(report, err).await),
        };
        info!("executing {} steps in order: {:?}", order.len(), order);
        self.log(&report, format!("Execution order: {}", order.join(" -> ")))
            .await;

        let steps: HashMap<&str, &Step> = request
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();

        report.status = RunStatus::Running;

        // ------------------------------------------------------------------
        // Execute steps sequentially.
        // ------------------------------------------------------------------
        for step_id in &order {
            let Some(&step) = steps.get(step_id.as_str()) else {
                continue;
            };
            report.execution_order.push(step.id.clone());

            let Some(handler) = self.registry.lookup(step.kind, &step.service) else {
                warn!(step_id = %step.id, service = %step.service, kind = %step.kind, "no handler registered, skipping");
                self.log(
                    &report,
                    format!("no handler for step {} ({})", step.service, step.kind),
                )
                .await;
                continue;
            };

            self.log(
                &report,
                format!("Running step {}: {} ({})", step.id, step.service, step.kind),
            )
            .await;

            match handler
                .execute(step, &report.context, &request.credentials)
                .await
            {
                Ok(output) if step.is_trigger() && is_empty_output(&output) => {
                    info!(step_id = %step.id, "trigger found nothing, stopping run");
                    self.log(&report, NO_NEW_DATA).await;
                    report.status = RunStatus::NoOp;
                    return Ok(report);
                }
                Ok(output) => {
                    info!(step_id = %step.id, "step succeeded");
                    self.log(&report, format!("Step {} result: {}", step.id, output)).await;
                    report.context.record(step, output);
                }
                Err(source) => {
                    let err = EngineError::StepFailed {
                        step_id: step.id.clone(),
                        source,
                    };
                    return Err(self.fail(report, err).await);
                }
            }
        }

        report.status = RunStatus::Completed;
        info!("run completed");
        self.log(&report, "Workflow executed.").await;
        Ok(report)
    }

    async fn log(&self, report: &RunReport, text: impl Into<String>) {
        if let Err(e) = self.run_log.append(&report.run_id, text).await {
            error!(run_id = %report.run_id, "cannot write run log: {}", e);
        }
    }

    async fn fail(&self, mut report: RunReport, error: EngineError) -> RunFailure {
        report.status = RunStatus::Failed;
        error!("run failed: {}", error);

        let line = match &error {
            EngineError::StepFailed { step_id, source } => {
                format!("step {step_id} failed: {source}")
            }
            other => format!("Workflow failed: {other}"),
        };
        self.log(&report, line).await;

        RunFailure { error, report }
    }
}
