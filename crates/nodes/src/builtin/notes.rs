//! Notes action: turns the triggering message into a new page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{first_item, NOTES_SERVICE};
use crate::{Credentials, ExecutionContext, Step, StepError, StepHandler};

/// The provider rejects paragraph blocks longer than this.
pub const MAX_PARAGRAPH_CHARS: usize = 2000;

const DEFAULT_TITLE: &str = "New Page";
const DEFAULT_CONTENT: &str = "Created from the workflow engine";

/// A page ready to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPage {
    pub parent: Option<String>,
    pub title: String,
    pub paragraphs: Vec<String>,
}

#[async_trait]
pub trait PagesClient: Send + Sync {
    /// Create `page` and return the provider's page object.
    async fn create_page(&self, token: &str, page: NewPage) -> Result<Value, StepError>;
}

pub struct NotesAction<C> {
    client: C,
}

impl<C: PagesClient> NotesAction<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

/// Split `content` into chunks of at most `max` characters.
pub fn paragraphs(content: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    chars.chunks(max.max(1)).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl<C: PagesClient> StepHandler for NotesAction<C> {
    async fn execute(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        credentials: &Credentials,
    ) -> Result<Value, StepError> {
        let Some(trigger) = ctx.trigger_data() else {
            debug!(step_id = %step.id, "no trigger data, skipping page creation");
            return Ok(Value::Null);
        };
        let token = credentials
            .token(NOTES_SERVICE)
            .ok_or_else(|| StepError::CredentialsMissing(NOTES_SERVICE.to_owned()))?;

        let message = first_item(trigger);
        let title = message
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TITLE);
        let content = message
            .get("body")
            .and_then(Value::as_str)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_CONTENT);

        let page = NewPage {
            parent: step.parent.clone(),
            title: title.to_owned(),
            paragraphs: paragraphs(content, MAX_PARAGRAPH_CHARS),
        };
        self.client.create_page(token, page).await
    }
}
