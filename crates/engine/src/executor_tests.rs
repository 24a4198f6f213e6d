//! Tests for the workflow execution engine.
//!
//! These use `MockHandler` from the nodes crate, so no real service
//! integration is involved.

use std::sync::Arc;

use serde_json::json;

use nodes::mock::MockHandler;
use nodes::{Credentials, HandlerRegistry, StepError, StepHandler, StepKind};

use crate::models::{Edge, RunRequest, RunStatus, Step};
use crate::{EngineError, RunLog, WorkflowEngine};

fn engine(registry: HandlerRegistry) -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(registry), Arc::new(RunLog::default()))
}

async fn log_lines(engine: &WorkflowEngine, run_id: &str) -> Vec<String> {
    engine
        .run_log()
        .tail(run_id, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.text)
        .collect()
}

fn position(order: &[String], id: &str) -> usize {
    order.iter().position(|s| s == id).unwrap()
}

/// Steps of the mailbox → notes + summary workflow.
fn mail_workflow() -> Vec<Step> {
    vec![
        Step::trigger("A", "mailbox"),
        Step::action("B", "notes"),
        Step::action("C", "summary"),
    ]
}

// ============================================================
// Scenario A: fan-out from a trigger
// ============================================================

#[tokio::test]
async fn trigger_runs_before_both_dependants() {
    let trigger = Arc::new(MockHandler::returning(json!([{ "subject": "hi" }])));
    let notes = Arc::new(MockHandler::returning(json!({ "page": "p1" })));
    let summary = Arc::new(MockHandler::returning(json!("short")));
    let registry = HandlerRegistry::new()
        .with(StepKind::Trigger, "mailbox", trigger.clone())
        .with(StepKind::Action, "notes", notes.clone())
        .with(StepKind::Action, "summary", summary.clone());
    let engine = engine(registry);

    let request = RunRequest::new(
        "wf",
        mail_workflow(),
        vec![Edge::new("A", "B"), Edge::new("A", "C")],
    );
    let report = engine.submit(request).await.expect("run should complete");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.execution_order[0], "A");
    assert_eq!(report.execution_order.len(), 3);
    assert_eq!(trigger.call_count(), 1);
    assert_eq!(notes.call_count(), 1);
    assert_eq!(summary.call_count(), 1);
    assert_eq!(report.context.get("B_result"), Some(&json!({ "page": "p1" })));
    assert_eq!(report.context.get("C_result"), Some(&json!("short")));
}

#[tokio::test]
async fn every_edge_is_respected() {
    let registry = ["a", "b", "c", "d", "e"].iter().fold(HandlerRegistry::new(), |r, s| {
        r.with(StepKind::Action, *s, Arc::new(MockHandler::returning(json!(1))))
    });
    let engine = engine(registry);
    let steps: Vec<Step> = ["e", "d", "c", "b", "a"]
        .iter()
        .map(|s| Step::action(*s, *s))
        .collect();
    let edges = vec![
        Edge::new("a", "c"),
        Edge::new("b", "c"),
        Edge::new("c", "e"),
        Edge::new("d", "e"),
        Edge::new("a", "d"),
    ];

    let report = engine
        .submit(RunRequest::new("wf", steps, edges.clone()))
        .await
        .unwrap();

    for e in &edges {
        assert!(position(&report.execution_order, &e.from) < position(&report.execution_order, &e.to));
    }
}

// ============================================================
// Scenario B: cycles abort before anything runs
// ============================================================

#[tokio::test]
async fn cycle_fails_without_invoking_handlers() {
    let handler = Arc::new(MockHandler::returning(json!("x")));
    let registry = HandlerRegistry::new().with(StepKind::Action, "svc", handler.clone());
    let engine = engine(registry);

    let request = RunRequest::new(
        "wf",
        vec![Step::action("A", "svc"), Step::action("B", "svc")],
        vec![Edge::new("A", "B"), Edge::new("B", "A")],
    )
    .with_run_id("cyclic");
    let failure = engine.submit(request).await.unwrap_err();

    match &failure.error {
        EngineError::CycleDetected { steps } => {
            let mut steps = steps.clone();
            steps.sort();
            assert_eq!(steps, vec!["A", "B"]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    assert_eq!(failure.report.status, RunStatus::Failed);
    assert!(failure.report.context.is_empty());
    assert!(failure.report.execution_order.is_empty());
    assert_eq!(handler.call_count(), 0);

    let lines = log_lines(&engine, "cyclic").await;
    assert!(lines.last().unwrap().contains("cycle"));
}

#[tokio::test]
async fn unknown_step_reference_fails_before_execution() {
    let handler = Arc::new(MockHandler::returning(json!("x")));
    let engine = engine(HandlerRegistry::new().with(StepKind::Action, "svc", handler.clone()));

    let failure = engine
        .submit(RunRequest::new(
            "wf",
            vec![Step::action("a", "svc")],
            vec![Edge::new("a", "ghost")],
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        EngineError::UnknownStepReference { ref step_id, .. } if step_id == "ghost"
    ));
    assert_eq!(handler.call_count(), 0);
}

// ============================================================
// Scenario C: missing handlers are skipped, not fatal
// ============================================================

#[tokio::test]
async fn missing_handler_is_logged_once_and_skipped() {
    let engine = engine(HandlerRegistry::new());
    let request =
        RunRequest::new("wf", vec![Step::action("A", "slack")], vec![]).with_run_id("no-handler");

    let report = engine.submit(request).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.context.is_empty());
    let lines = log_lines(&engine, "no-handler").await;
    let no_handler: Vec<_> = lines.iter().filter(|l| l.contains("no handler")).collect();
    assert_eq!(no_handler, vec!["no handler for step slack (action)"]);
}

#[tokio::test]
async fn missing_handler_between_steps_does_not_break_the_chain() {
    let trigger = Arc::new(MockHandler::returning(json!({ "subject": "s" })));
    let last = Arc::new(MockHandler::echo_trigger());
    let engine = engine(
        HandlerRegistry::new()
            .with(StepKind::Trigger, "mailbox", trigger)
            .with(StepKind::Action, "summary", last.clone()),
    );

    let report = engine
        .submit(RunRequest::new(
            "wf",
            mail_workflow(),
            vec![Edge::new("A", "B"), Edge::new("B", "C")],
        ))
        .await
        .unwrap();

    assert_eq!(report.execution_order, vec!["A", "B", "C"]);
    assert!(!report.context.contains_key("B_result"));
    assert_eq!(report.context.get("C_result"), Some(&json!({ "subject": "s" })));
}

// ============================================================
// Scenario D: empty trigger short-circuits
// ============================================================

#[tokio::test]
async fn empty_trigger_result_is_a_no_op() {
    let trigger = Arc::new(MockHandler::returning(json!([])));
    let notes = Arc::new(MockHandler::returning(json!("never")));
    let engine = engine(
        HandlerRegistry::new()
            .with(StepKind::Trigger, "mailbox", trigger.clone())
            .with(StepKind::Action, "notes", notes.clone())
            .with(StepKind::Action, "summary", notes.clone()),
    );

    let request = RunRequest::new(
        "wf",
        mail_workflow(),
        vec![Edge::new("A", "B"), Edge::new("A", "C")],
    )
    .with_run_id("quiet");
    let report = engine.submit(request).await.unwrap();

    assert_eq!(report.status, RunStatus::NoOp);
    assert_eq!(report.execution_order, vec!["A"]);
    assert_eq!(trigger.call_count(), 1);
    assert_eq!(notes.call_count(), 0);
    assert!(report.context.is_empty());

    let lines = log_lines(&engine, "quiet").await;
    assert_eq!(lines.iter().filter(|l| *l == "no new data").count(), 1);
    assert_eq!(lines.last().map(String::as_str), Some("no new data"));
}

#[tokio::test]
async fn empty_action_result_does_not_short_circuit() {
    let first = Arc::new(MockHandler::empty());
    let second = Arc::new(MockHandler::returning(json!("done")));
    let engine = engine(
        HandlerRegistry::new()
            .with(StepKind::Action, "first", first)
            .with(StepKind::Action, "second", second.clone()),
    );

    let report = engine
        .submit(RunRequest::new(
            "wf",
            vec![Step::action("one", "first"), Step::action("two", "second")],
            vec![Edge::new("one", "two")],
        ))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(second.call_count(), 1);
    assert_eq!(report.context.get("one_result"), Some(&serde_json::Value::Null));
}

// ============================================================
// Context propagation
// ============================================================

#[tokio::test]
async fn trigger_output_is_visible_downstream_under_both_keys() {
    let payload = json!([{ "subject": "Invoice", "body": "due" }]);
    let trigger = Arc::new(MockHandler::returning(payload.clone()));
    let notes = Arc::new(MockHandler::returning(json!("ok")));
    let summary = Arc::new(MockHandler::returning(json!("ok")));
    let engine = engine(
        HandlerRegistry::new()
            .with(StepKind::Trigger, "mailbox", trigger)
            .with(StepKind::Action, "notes", notes.clone())
            .with(StepKind::Action, "summary", summary.clone()),
    );

    engine
        .submit(RunRequest::new(
            "wf",
            mail_workflow(),
            vec![Edge::new("A", "B"), Edge::new("B", "C")],
        ))
        .await
        .unwrap();

    for handler in [&notes, &summary] {
        let call = &handler.calls()[0];
        assert_eq!(call.context.trigger_data(), Some(&payload));
        assert_eq!(call.context.get("A_result"), Some(&payload));
    }
    // The summary step also sees the notes step's output.
    assert_eq!(summary.calls()[0].context.get("B_result"), Some(&json!("ok")));
    assert!(notes.calls()[0].context.get("B_result").is_none());
}

#[tokio::test]
async fn credentials_reach_handlers() {
    let handler = Arc::new(MockHandler::returning(json!(1)));
    let engine = engine(HandlerRegistry::new().with(StepKind::Action, "notes", handler.clone()));

    engine
        .submit(
            RunRequest::new("wf", vec![Step::action("n", "notes")], vec![])
                .with_credentials(Credentials::new().with("notes", "tok")),
        )
        .await
        .unwrap();

    assert_eq!(handler.calls()[0].credentials.token("notes"), Some("tok"));
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn failing_step_stops_the_run_and_keeps_prior_context() {
    let ok = Arc::new(MockHandler::returning(json!({ "ok": true })));
    let boom = Arc::new(MockHandler::failing("something broke irreparably"));
    let never = Arc::new(MockHandler::returning(json!({ "should": "not run" })));
    let engine = engine(
        HandlerRegistry::new()
            .with(StepKind::Action, "ok", ok)
            .with(StepKind::Action, "boom", boom)
            .with(StepKind::Action, "never", never.clone()),
    );

    let request = RunRequest::new(
        "wf",
        vec![
            Step::action("ok", "ok"),
            Step::action("boom", "boom"),
            Step::action("never", "never"),
        ],
        vec![Edge::new("ok", "boom"), Edge::new("boom", "never")],
    )
    .with_run_id("broken");
    let failure = engine.submit(request).await.unwrap_err();

    assert_eq!(failure.error.failed_step(), Some("boom"));
    assert_eq!(failure.report.status, RunStatus::Failed);
    assert_eq!(failure.report.execution_order, vec!["ok", "boom"]);
    assert_eq!(failure.report.context.get("ok_result"), Some(&json!({ "ok": true })));
    assert!(!failure.report.context.contains_key("boom_result"));
    assert_eq!(never.call_count(), 0);

    let lines = log_lines(&engine, "broken").await;
    assert_eq!(
        lines.last().unwrap(),
        "step boom failed: something broke irreparably"
    );
}

#[tokio::test]
async fn credentials_missing_is_reported_as_a_step_failure() {
    struct NeedsToken;

    #[async_trait::async_trait]
    impl StepHandler for NeedsToken {
        async fn execute(
            &self,
            _step: &Step,
            _ctx: &nodes::ExecutionContext,
            credentials: &Credentials,
        ) -> Result<serde_json::Value, StepError> {
            credentials
                .token("notes")
                .map(|_| json!("ok"))
                .ok_or_else(|| StepError::CredentialsMissing("notes".into()))
        }
    }

    let engine = engine(HandlerRegistry::new().with(StepKind::Action, "notes", Arc::new(NeedsToken)));
    let failure = engine
        .submit(RunRequest::new("wf", vec![Step::action("n", "notes")], vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        EngineError::StepFailed { source: StepError::CredentialsMissing(_), .. }
    ));
}

// ============================================================
// Logging and isolation
// ============================================================

#[tokio::test]
async fn generated_run_ids_are_unique_and_logs_are_separate() {
    let engine = engine(HandlerRegistry::new());
    let request = RunRequest::new("wf", vec![Step::action("A", "slack")], vec![]);

    let first = engine.submit(request.clone()).await.unwrap();
    let second = engine.submit(request).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    let first_log = engine.run_log().tail(&first.run_id, 0).await.unwrap();
    assert_eq!(first_log.first().unwrap().text, "Workflow started.");
    assert_eq!(first_log.last().unwrap().text, "Workflow executed.");
    assert!(first_log.iter().all(|e| e.run_id == first.run_id));
}

#[tokio::test]
async fn concurrent_runs_do_not_share_context() {
    let trigger = Arc::new(MockHandler::returning(json!("mail")));
    let echo = Arc::new(MockHandler::echo_trigger());
    let engine = engine(
        HandlerRegistry::new()
            .with(StepKind::Trigger, "mailbox", trigger)
            .with(StepKind::Action, "notes", echo),
    );

    let runs = (0..16).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .submit(
                    RunRequest::new(
                        format!("wf-{i}"),
                        vec![Step::trigger("t", "mailbox"), Step::action("n", "notes")],
                        vec![Edge::new("t", "n")],
                    )
                    .with_run_id(format!("run-{i}")),
                )
                .await
        })
    });

    for run in runs.collect::<Vec<_>>() {
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.context.len(), 3);
        assert_eq!(report.context.get("n_result"), Some(&json!("mail")));
        assert_eq!(
            engine
                .run_log()
                .tail(&report.run_id, 0)
                .await
                .unwrap()
                .last()
                .unwrap()
                .text,
            "Workflow executed."
        );
    }
}
