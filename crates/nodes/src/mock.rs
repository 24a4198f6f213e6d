//! `MockHandler`: a test double for `StepHandler`.
//!
//! Useful in unit and integration tests where a real service integration is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{Credentials, ExecutionContext, Step, StepError, StepHandler};

/// Behaviour injected into `MockHandler` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Echo `trigger_data` back, or `null` when there is none.
    EchoTrigger,
    /// Fail with the given message.
    Fail(String),
}

/// What the handler saw on one call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub step_id: String,
    pub context: ExecutionContext,
    pub credentials: Credentials,
}

/// A mock handler that records every call it receives and returns a
/// programmer-specified result.
pub struct MockHandler {
    /// What the handler will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Every call seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockHandler {
    fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(value: Value) -> Self {
        Self::with_behaviour(MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that finds nothing (returns `null`).
    pub fn empty() -> Self {
        Self::with_behaviour(MockBehaviour::ReturnValue(Value::Null))
    }

    /// Create a mock that returns whatever the trigger produced.
    pub fn echo_trigger() -> Self {
        Self::with_behaviour(MockBehaviour::EchoTrigger)
    }

    /// Create a mock that always fails.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::Fail(msg.into()))
    }

    /// Number of times this handler has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepHandler for MockHandler {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        credentials: &Credentials,
    ) -> Result<Value, StepError> {
        self.calls.lock().unwrap().push(MockCall {
            step_id: step.id.clone(),
            context: ctx.snapshot(),
            credentials: credentials.clone(),
        });

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::EchoTrigger => Ok(ctx.trigger_data().cloned().unwrap_or(Value::Null)),
            MockBehaviour::Fail(msg) => Err(StepError::failed(msg.clone())),
        }
    }
}
