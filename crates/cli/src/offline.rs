//! Service clients for running workflows without network access.
//!
//! The mailbox reads messages from an optional JSON fixture, pages are
//! acknowledged with a generated id, and completions echo their prompt.
//! Production deployments link their own `MailboxClient`, `PagesClient`
//! and `CompletionClient` implementations instead.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use nodes::builtin::{
    CompletionClient, CompletionRequest, MailMessage, MailboxClient, NewPage, PagesClient,
};
use nodes::StepError;

/// Serves the messages stored in a JSON array file, if one is configured.
#[derive(Debug, Clone, Default)]
pub struct FixtureMailbox {
    path: Option<PathBuf>,
}

impl FixtureMailbox {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MailboxClient for FixtureMailbox {
    async fn fetch_new(&self, _token: &str) -> Result<Vec<MailMessage>, StepError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StepError::failed(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| StepError::failed(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPages;

#[async_trait]
impl PagesClient for LoggingPages {
    async fn create_page(&self, _token: &str, page: NewPage) -> Result<Value, StepError> {
        let id = Uuid::new_v4().to_string();
        info!(page_id = %id, title = %page.title, paragraphs = page.paragraphs.len(), "page created (offline)");
        Ok(json!({
            "object": "page",
            "id": id,
            "parent": page.parent,
            "title": page.title,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCompletion;

#[async_trait]
impl CompletionClient for EchoCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, StepError> {
        Ok(request.prompt)
    }
}
