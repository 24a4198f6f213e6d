//! The `StepHandler` trait: the contract every service integration fulfils.

use async_trait::async_trait;
use serde_json::Value;

use crate::{Credentials, ExecutionContext, Step, StepError};

/// Executes one `(kind, service)` step.
///
/// Implementations read what they need from `ctx` and return their output;
/// the engine decides where that output is stored. Adding an integration
/// means implementing this trait and registering it, never touching the
/// engine.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        credentials: &Credentials,
    ) -> Result<Value, StepError>;
}
