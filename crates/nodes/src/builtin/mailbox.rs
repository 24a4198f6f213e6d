//! Mail trigger: fetches new messages for the run's mailbox credential.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::MAILBOX_SERVICE;
use crate::{Credentials, ExecutionContext, Step, StepError, StepHandler};

const BODY_PREVIEW_CHARS: usize = 100;

/// One message as handed to downstream steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub subject: String,
    pub body: String,
    /// ISO-8601 receive time, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Provider access for [`MailboxTrigger`].
#[async_trait]
pub trait MailboxClient: Send + Sync {
    async fn fetch_new(&self, token: &str) -> Result<Vec<MailMessage>, StepError>;
}

pub struct MailboxTrigger<C> {
    client: C,
}

impl<C: MailboxClient> MailboxTrigger<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: MailboxClient> StepHandler for MailboxTrigger<C> {
    async fn execute(
        &self,
        step: &Step,
        _ctx: &ExecutionContext,
        credentials: &Credentials,
    ) -> Result<Value, StepError> {
        // No token means nothing can be new.
        let Some(token) = credentials.token(MAILBOX_SERVICE) else {
            debug!(step_id = %step.id, "no mailbox credential, reporting no data");
            return Ok(Value::Null);
        };

        let messages: Vec<MailMessage> = self
            .client
            .fetch_new(token)
            .await?
            .into_iter()
            .map(|mut m| {
                m.body = m.body.trim().chars().take(BODY_PREVIEW_CHARS).collect();
                m
            })
            .collect();

        debug!(step_id = %step.id, count = messages.len(), "fetched mailbox");
        serde_json::to_value(messages).map_err(|e| StepError::failed(e.to_string()))
    }
}
