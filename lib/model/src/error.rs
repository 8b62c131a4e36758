//! Error types for the model crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Low-level graph construction and validation
//! - `ModelError`: Model lookup and navigation, surfaced to the kernel

use crate::element::ElementId;
use std::fmt;

/// Errors from graph operations.
///
/// These errors know nothing about model versions; the store adds that
/// context when it rejects a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Element with the given ID was not found in the graph.
    ElementNotFound { element_id: ElementId },
    /// Two task elements share the same task id.
    DuplicateTaskId { task_id: i64 },
    /// A link throw has no catch with the same name.
    UnmatchedLink { name: String },
    /// A boundary event is attached to something other than a task.
    DetachedBoundary { element_id: ElementId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementNotFound { element_id } => {
                write!(f, "element not found: {element_id}")
            }
            Self::DuplicateTaskId { task_id } => {
                write!(f, "task id {task_id} is defined more than once")
            }
            Self::UnmatchedLink { name } => {
                write!(f, "link throw '{name}' has no matching catch")
            }
            Self::DetachedBoundary { element_id } => {
                write!(f, "boundary event {element_id} is not attached to a task")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from model lookup and navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No model matches the requested version, pattern or group.
    UndefinedModelVersion { version: String },
    /// The task, or the event on that task, does not exist.
    UndefinedModelEntry {
        version: String,
        task_id: i64,
        event_id: Option<i64>,
    },
    /// The model is structurally invalid for the requested operation.
    InvalidModel { version: String, reason: String },
}

impl ModelError {
    pub(crate) fn invalid(version: &str, reason: impl Into<String>) -> Self {
        Self::InvalidModel {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedModelVersion { version } => {
                write!(f, "$modelversion '{version}' not found")
            }
            Self::UndefinedModelEntry {
                version,
                task_id,
                event_id: Some(event_id),
            } => {
                write!(
                    f,
                    "model entry {task_id}.{event_id} not found for model version '{version}'"
                )
            }
            Self::UndefinedModelEntry {
                version,
                task_id,
                event_id: None,
            } => {
                write!(f, "task {task_id} not found for model version '{version}'")
            }
            Self::InvalidModel { version, reason } => {
                write!(f, "invalid model '{version}': {reason}")
            }
        }
    }
}

impl std::error::Error for ModelError {}
