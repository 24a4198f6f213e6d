//! Built-in service handlers.
//!
//! Each handler owns the data shaping for its integration and talks to the
//! outside world through a small client trait the host implements. The
//! handlers never resolve or refresh tokens themselves.

use std::sync::Arc;

pub mod completion;
pub mod mailbox;
pub mod notes;

pub use completion::{CompletionAction, CompletionClient, CompletionRequest};
pub use mailbox::{MailMessage, MailboxClient, MailboxTrigger};
pub use notes::{NewPage, NotesAction, PagesClient};

use crate::{HandlerRegistry, StepKind};

pub const MAILBOX_SERVICE: &str = "gmail";
pub const NOTES_SERVICE: &str = "notion";
pub const COMPLETION_SERVICE: &str = "openai";

/// Register the three built-in integrations on `registry`.
pub fn register_builtins<M, P, C>(registry: &mut HandlerRegistry, mailbox: M, pages: P, completions: C)
where
    M: MailboxClient + 'static,
    P: PagesClient + 'static,
    C: CompletionClient + 'static,
{
    registry
        .register(
            StepKind::Trigger,
            MAILBOX_SERVICE,
            Arc::new(MailboxTrigger::new(mailbox)),
        )
        .register(StepKind::Action, NOTES_SERVICE, Arc::new(NotesAction::new(pages)))
        .register(
            StepKind::Action,
            COMPLETION_SERVICE,
            Arc::new(CompletionAction::new(completions)),
        );
}

/// The first message of a trigger payload: either the first element of an
/// array or the payload itself.
pub(crate) fn first_item(trigger: &serde_json::Value) -> &serde_json::Value {
    match trigger {
        serde_json::Value::Array(items) => items.first().unwrap_or(trigger),
        other => other,
    }
}
