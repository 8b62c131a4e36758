//! The workitem record advanced by the kernel.
//!
//! A workitem is an ordered collection of named items. Every item holds a
//! list of JSON values; a single value is a list of length one. Item names
//! are case-insensitive and stored lowercase.

use crate::fields::{self, legacy};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A data record with multi-value items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workitem {
    items: IndexMap<String, Vec<Value>>,
}

impl Workitem {
    /// Creates an empty workitem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a workitem positioned at a task, ready to fire an event.
    #[must_use]
    pub fn at(model_version: &str, task_id: i64, event_id: i64) -> Self {
        Self::new()
            .with_item(fields::MODEL_VERSION, model_version)
            .with_item(fields::TASK_ID, task_id)
            .with_item(fields::EVENT_ID, event_id)
    }

    /// Builder form of [`replace_item_value`](Self::replace_item_value).
    #[must_use]
    pub fn with_item(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.replace_item_value(name, value);
        self
    }

    /// Returns true if the item exists, even when it holds no values.
    #[must_use]
    pub fn has_item(&self, name: &str) -> bool {
        self.items.contains_key(&key(name))
    }

    /// Returns all values of an item; empty if the item does not exist.
    #[must_use]
    pub fn item_values(&self, name: &str) -> &[Value] {
        self.items
            .get(&key(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the first value of an item.
    #[must_use]
    pub fn item_value(&self, name: &str) -> Option<&Value> {
        self.item_values(name).first()
    }

    /// Returns the first value as text; empty if absent or null.
    #[must_use]
    pub fn item_value_string(&self, name: &str) -> String {
        match self.item_value(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Returns the first value as an integer; 0 if absent or not numeric.
    #[must_use]
    pub fn item_value_integer(&self, name: &str) -> i64 {
        match self.item_value(name) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Returns the first value as a float; 0.0 if absent or not numeric.
    #[must_use]
    pub fn item_value_double(&self, name: &str) -> f64 {
        match self.item_value(name) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Returns the first value as a boolean; `"true"` strings count.
    #[must_use]
    pub fn item_value_bool(&self, name: &str) -> bool {
        match self.item_value(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Replaces an item with a single value.
    ///
    /// An array value is stored as the item's value list.
    pub fn replace_item_value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let values = match value.into() {
            Value::Array(values) => values,
            single => vec![single],
        };
        self.items.insert(key(name), values);
        self
    }

    /// Replaces an item with a list of values.
    pub fn set_item_values(&mut self, name: &str, values: Vec<Value>) -> &mut Self {
        self.items.insert(key(name), values);
        self
    }

    /// Appends a value to an item, creating it when missing.
    pub fn append_item_value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.items.entry(key(name)).or_default().push(value.into());
        self
    }

    /// Removes an item and returns its values.
    pub fn remove_item(&mut self, name: &str) -> Option<Vec<Value>> {
        self.items.shift_remove(&key(name))
    }

    /// Iterates the item names in insertion order.
    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the workitem has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current task id, falling back to `$processid`.
    #[must_use]
    pub fn task_id(&self) -> i64 {
        self.integer_with_fallback(fields::TASK_ID, legacy::PROCESS_ID)
    }

    /// Event to fire, falling back to `$activityid`.
    #[must_use]
    pub fn event_id(&self) -> i64 {
        self.integer_with_fallback(fields::EVENT_ID, legacy::ACTIVITY_ID)
    }

    pub fn set_task_id(&mut self, task_id: i64) -> &mut Self {
        self.replace_item_value(fields::TASK_ID, task_id)
    }

    pub fn set_event_id(&mut self, event_id: i64) -> &mut Self {
        self.replace_item_value(fields::EVENT_ID, event_id)
    }

    #[must_use]
    pub fn unique_id(&self) -> String {
        self.item_value_string(fields::UNIQUE_ID)
    }

    #[must_use]
    pub fn model_version(&self) -> String {
        self.item_value_string(fields::MODEL_VERSION)
    }

    /// Workflow group, falling back to `txtworkflowgroup`.
    #[must_use]
    pub fn workflow_group(&self) -> String {
        let group = self.item_value_string(fields::WORKFLOW_GROUP);
        if group.is_empty() {
            self.item_value_string(legacy::WORKFLOW_GROUP)
        } else {
            group
        }
    }

    #[must_use]
    pub fn runs(&self) -> i64 {
        self.item_value_integer(fields::RUNS)
    }

    /// Returns the event log entries as text.
    #[must_use]
    pub fn event_log(&self) -> Vec<String> {
        let name = if self.has_item(fields::EVENT_LOG) {
            fields::EVENT_LOG
        } else {
            legacy::EVENT_LOG
        };
        self.item_values(name)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    fn integer_with_fallback(&self, name: &str, fallback: &str) -> i64 {
        if self.has_item(name) {
            self.item_value_integer(name)
        } else {
            self.item_value_integer(fallback)
        }
    }
}

fn key(name: &str) -> String {
    name.to_lowercase()
}
