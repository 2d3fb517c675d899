//! Run context: the append-only store of the trigger and step outputs.
//!
//! `Context` is owned by a single run. Every key is written at most once:
//! the trigger under the reserved `"trigger"` key when the run is created,
//! then each step's output under its step id as the step completes.
//!
//! `StepContext` is the read-only view handed to a step body. It only
//! exposes the trigger and the outputs the step declared in `requires`.

use std::collections::HashMap;

use flowrun_types::workflow::TRIGGER_KEY;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::step::{StepDefinition, StepError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The key already holds a value. Outputs are never overwritten.
    #[error("context key '{0}' is already written")]
    AlreadyWritten(String),

    /// No value is stored under the key.
    #[error("context key '{0}' is not present")]
    Missing(String),

    /// The stored value does not decode into the requested type.
    #[error("cannot decode context key '{key}': {message}")]
    Decode { key: String, message: String },

    /// The serialized output exceeds the per-step limit.
    #[error("output of step '{step_id}' is {size} bytes, limit is {max}")]
    OutputTooLarge {
        step_id: String,
        size: usize,
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Append-only mapping of `"trigger"` and step ids to JSON values.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    entries: HashMap<String, Value>,
    /// Keys in write order; the trigger is always first.
    order: Vec<String>,
}

impl Context {
    /// Create a context seeded with the trigger input.
    pub fn new(trigger: Value) -> Self {
        let mut entries = HashMap::new();
        entries.insert(TRIGGER_KEY.to_string(), trigger);
        Self {
            entries,
            order: vec![TRIGGER_KEY.to_string()],
        }
    }

    /// Record a step output.
    pub fn insert(&mut self, step_id: &str, output: Value) -> Result<(), ContextError> {
        if self.entries.contains_key(step_id) {
            return Err(ContextError::AlreadyWritten(step_id.to_string()));
        }
        self.entries.insert(step_id.to_string(), output);
        self.order.push(step_id.to_string());
        Ok(())
    }

    /// Record a step output whose serialized form must not exceed `max_bytes`.
    pub fn insert_with_limit(
        &mut self,
        step_id: &str,
        output: Value,
        max_bytes: usize,
    ) -> Result<(), ContextError> {
        let size = serde_json::to_vec(&output).map(|v| v.len()).unwrap_or(0);
        if size > max_bytes {
            return Err(ContextError::OutputTooLarge {
                step_id: step_id.to_string(),
                size,
                max: max_bytes,
            });
        }
        self.insert(step_id, output)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Decode the value under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| ContextError::Missing(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    pub fn trigger(&self) -> &Value {
        // Seeded in `new` and never removed.
        self.entries.get(TRIGGER_KEY).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in write order, trigger first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Ids of the steps that have recorded output, in completion order.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.keys().skip(1)
    }

    /// Number of entries, including the trigger.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false: the trigger is present from creation.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The whole context as a JSON object.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        Value::Object(map)
    }

    /// Copy of the trigger plus the named keys that are present.
    fn subset(&self, keys: &[String]) -> Context {
        let mut scoped = Context::new(self.trigger().clone());
        for key in keys {
            if let Some(value) = self.entries.get(key) {
                scoped.entries.insert(key.clone(), value.clone());
                scoped.order.push(key.clone());
            }
        }
        scoped
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Read-only view of a run's context given to one step execution.
#[derive(Debug, Clone)]
pub struct StepContext {
    run_id: Uuid,
    workflow: String,
    step_id: String,
    requires: Vec<String>,
    readable: Context,
    input: Value,
}

impl StepContext {
    /// Build the view for `step` over the run's current context.
    pub fn new(run_id: Uuid, workflow: &str, step: &StepDefinition, context: &Context) -> Self {
        let requires = step.required_steps().to_vec();
        let readable = context.subset(&requires);
        let input = input_view(&readable, &requires);
        Self {
            run_id,
            workflow: workflow.to_string(),
            step_id: step.id().to_string(),
            requires,
            readable,
            input,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    /// Shallow merge of the trigger fields and each required output's fields,
    /// in declaration order. Later sources win on key collisions. Outputs that
    /// are not objects appear under their step id.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Decode the whole trigger input.
    pub fn trigger<T: DeserializeOwned>(&self) -> Result<T, StepError> {
        self.get(TRIGGER_KEY)
    }

    /// Decode one top-level trigger field. A missing field decodes as `null`,
    /// so `Option<T>` reads optional fields.
    pub fn trigger_field<T: DeserializeOwned>(&self, field: &str) -> Result<T, StepError> {
        let value = self
            .readable
            .trigger()
            .get(field)
            .cloned()
            .unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| StepError::Decode {
            step_id: format!("{TRIGGER_KEY}.{field}"),
            message: e.to_string(),
        })
    }

    /// Decode the output of a declared dependency.
    pub fn get<T: DeserializeOwned>(&self, step_id: &str) -> Result<T, StepError> {
        let value = self.raw(step_id)?;
        serde_json::from_value(value.clone()).map_err(|e| StepError::Decode {
            step_id: step_id.to_string(),
            message: e.to_string(),
        })
    }

    /// Like [`StepContext::get`], but a declared dependency with no output
    /// (a skipped branch step) yields `None`.
    pub fn get_optional<T: DeserializeOwned>(&self, step_id: &str) -> Result<Option<T>, StepError> {
        match self.get(step_id) {
            Ok(value) => Ok(Some(value)),
            Err(StepError::MissingOutput(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Raw JSON output of a declared dependency.
    pub fn raw(&self, step_id: &str) -> Result<&Value, StepError> {
        if !self.is_readable(step_id) {
            return Err(StepError::UndeclaredDependency {
                requested: step_id.to_string(),
            });
        }
        self.readable
            .get(step_id)
            .ok_or_else(|| StepError::MissingOutput(step_id.to_string()))
    }

    /// Whether this step may read `key`.
    pub fn is_readable(&self, key: &str) -> bool {
        key == TRIGGER_KEY || self.requires.iter().any(|r| r == key)
    }

    /// Replace `{{ trigger.path }}` and `{{ step-id.path }}` placeholders.
    ///
    /// Paths walk object fields and array indices. Placeholders that do not
    /// resolve (unknown key, undeclared step, missing field) are left as-is.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let end = start + 2 + len + 2;
            let expr = rest[start + 2..start + 2 + len].trim();

            out.push_str(&rest[..start]);
            match self.lookup(expr) {
                Some(value) => out.push_str(&value_to_string(value)),
                None => out.push_str(&rest[start..end]),
            }
            rest = &rest[end..];
        }

        out.push_str(rest);
        out
    }

    fn lookup(&self, expr: &str) -> Option<&Value> {
        let mut segments = expr.split('.');
        let key = segments.next()?;
        if !self.is_readable(key) {
            return None;
        }
        let mut value = self.readable.get(key)?;
        for segment in segments {
            value = match value {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value)
    }
}

fn input_view(readable: &Context, requires: &[String]) -> Value {
    let mut merged = Map::new();
    if let Value::Object(fields) = readable.trigger() {
        merged.extend(fields.clone());
    }
    for id in requires {
        match readable.get(id) {
            Some(Value::Object(fields)) => merged.extend(fields.clone()),
            Some(other) => {
                merged.insert(id.clone(), other.clone());
            }
            None => {}
        }
    }
    Value::Object(merged)
}

/// Convert a JSON value to its template string form.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
