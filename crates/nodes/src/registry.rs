//! Dispatch table from `(kind, service)` to a handler.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{StepHandler, StepKind};

/// Lookup key for a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub kind: StepKind,
    pub service: String,
}

impl HandlerKey {
    pub fn new(kind: StepKind, service: impl Into<String>) -> Self {
        Self {
            kind,
            service: service.into(),
        }
    }
}

/// Populated once at start-up, then shared read-only (behind an `Arc`)
/// by every run. Registration needs `&mut self`, so it cannot happen once
/// the registry has been handed to an engine.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `(kind, service)`, replacing any previous entry.
    pub fn register(
        &mut self,
        kind: StepKind,
        service: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> &mut Self {
        let key = HandlerKey::new(kind, service);
        debug!(kind = %key.kind, service = %key.service, "registering step handler");
        self.handlers.insert(key, handler);
        self
    }

    /// Builder-style variant of [`HandlerRegistry::register`].
    pub fn with(
        mut self,
        kind: StepKind,
        service: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Self {
        self.register(kind, service, handler);
        self
    }

    pub fn lookup(&self, kind: StepKind, service: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers
            .get(&HandlerKey::new(kind, service))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
