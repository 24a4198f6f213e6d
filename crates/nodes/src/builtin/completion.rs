//! Completion action: asks a language model about the triggering data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Credentials, ExecutionContext, Step, StepError, StepHandler};

pub const DEFAULT_PROMPT: &str = "Summarize the following email:";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the model's reply text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, StepError>;
}

pub struct CompletionAction<C> {
    client: C,
}

impl<C: CompletionClient> CompletionAction<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

/// Prompt text sent for `step` given the run's trigger data.
pub fn build_prompt(step: &Step, trigger: &Value) -> String {
    let prompt = step.param_str("prompt").unwrap_or(DEFAULT_PROMPT);
    format!("{prompt}\n\nEmail Content:\n{trigger}")
}

#[async_trait]
impl<C: CompletionClient> StepHandler for CompletionAction<C> {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        _credentials: &Credentials,
    ) -> Result<Value, StepError> {
        let Some(trigger) = ctx.trigger_data() else {
            return Ok(Value::Null);
        };

        let request = CompletionRequest {
            model: DEFAULT_MODEL.to_owned(),
            prompt: build_prompt(step, trigger),
            temperature: 0.6,
            max_tokens: 300,
        };
        let reply = self.client.complete(request).await?;
        Ok(Value::String(reply))
    }
}
