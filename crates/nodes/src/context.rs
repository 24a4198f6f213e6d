//! Per-run key/value store carrying step outputs forward.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::Step;

/// Key under which the trigger's output is always stored.
pub const TRIGGER_DATA_KEY: &str = "trigger_data";

/// Suffix appended to a step id to form its result key.
pub const RESULT_SUFFIX: &str = "_result";

/// Context key for the raw result of `step_id`.
pub fn result_key(step_id: &str) -> String {
    format!("{step_id}{RESULT_SUFFIX}")
}

/// Mutable state threaded through one run.
///
/// Owned by the engine for the lifetime of the run. Handlers only ever see
/// a shared reference and hand their output back; the engine does the write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Output of the step that started this run, if any.
    pub fn trigger_data(&self) -> Option<&Value> {
        self.get(TRIGGER_DATA_KEY).filter(|v| !v.is_null())
    }

    /// Raw result recorded for `step_id`.
    pub fn result_of(&self, step_id: &str) -> Option<&Value> {
        self.values.get(&result_key(step_id))
    }

    /// Store `output` as the result of `step`, mirroring trigger output
    /// under [`TRIGGER_DATA_KEY`].
    pub fn record(&mut self, step: &Step, output: Value) {
        if step.is_trigger() {
            self.values
                .insert(TRIGGER_DATA_KEY.to_owned(), output.clone());
        }
        self.values.insert(result_key(&step.id), output);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> ExecutionContext {
        self.clone()
    }
}

/// Whether a handler's output counts as "nothing found".
pub fn is_empty_output(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trigger_output_lands_under_both_keys() {
        let mut ctx = ExecutionContext::new();
        ctx.record(&Step::trigger("mail", "gmail"), json!([{ "subject": "hi" }]));

        assert_eq!(ctx.trigger_data(), Some(&json!([{ "subject": "hi" }])));
        assert_eq!(ctx.result_of("mail"), ctx.trigger_data());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn action_output_only_under_result_key() {
        let mut ctx = ExecutionContext::new();
        ctx.record(&Step::action("page", "notion"), json!({ "id": "p1" }));

        assert!(ctx.trigger_data().is_none());
        assert!(ctx.contains_key("page_result"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn empty_outputs() {
        assert!(is_empty_output(&Value::Null));
        assert!(is_empty_output(&json!([])));
        assert!(is_empty_output(&json!({})));
        assert!(is_empty_output(&json!("")));
        assert!(!is_empty_output(&json!(0)));
        assert!(!is_empty_output(&json!(false)));
        assert!(!is_empty_output(&json!(["x"])));
    }
}
