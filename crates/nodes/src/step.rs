//! The `Step` definition shared by the engine and every handler.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a step detects new data or acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Trigger,
    Action,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger => write!(f, "trigger"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// A single unit of work in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StepWire")]
pub struct Step {
    /// Unique identifier within the run (referenced by edges).
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Name of the external service, e.g. `gmail`.
    pub service: String,
    /// Service-specific action name, e.g. `create_page`.
    #[serde(default)]
    pub action: String,
    /// Container the step writes into (target page for a created document).
    #[serde(default, rename = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Free-form parameters, e.g. `{"prompt": "..."}`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Inbound shape. Editors put `prompt` next to the step's other fields
/// rather than under `params`.
#[derive(Deserialize)]
struct StepWire {
    id: String,
    #[serde(rename = "type")]
    kind: StepKind,
    service: String,
    #[serde(default)]
    action: String,
    #[serde(default, rename = "parentId")]
    parent: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    prompt: Option<String>,
}

impl From<StepWire> for Step {
    fn from(wire: StepWire) -> Self {
        let mut params = wire.params;
        if let Some(prompt) = wire.prompt {
            if params.is_null() {
                params = Value::Object(Default::default());
            }
            // An explicit `params.prompt` wins.
            if let Value::Object(map) = &mut params {
                map.entry("prompt").or_insert(Value::String(prompt));
            }
        }
        Self {
            id: wire.id,
            kind: wire.kind,
            service: wire.service,
            action: wire.action,
            parent: wire.parent,
            params,
        }
    }
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        kind: StepKind,
        service: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            service: service.into(),
            action: action.into(),
            parent: None,
            params: Value::Null,
        }
    }

    pub fn trigger(id: impl Into<String>, service: impl Into<String>) -> Self {
        Self::new(id, StepKind::Trigger, service, "")
    }

    pub fn action(id: impl Into<String>, service: impl Into<String>) -> Self {
        Self::new(id, StepKind::Action, service, "")
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn is_trigger(&self) -> bool {
        self.kind == StepKind::Trigger
    }

    /// Look up a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}
