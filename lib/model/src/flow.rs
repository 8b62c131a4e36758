//! Sequence flows connecting model elements.

use serde::{Deserialize, Serialize};

/// A directed flow between two elements.
///
/// Flows leaving an event or an exclusive gateway may carry a condition
/// script; one of them may be marked as the default taken when no condition
/// holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    /// Boolean script evaluated against the workitem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Taken when no conditional sibling matches.
    #[serde(default)]
    pub default: bool,
}

impl SequenceFlow {
    /// Creates an unconditional flow.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Creates a flow guarded by a condition script.
    #[must_use]
    pub fn conditional(condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            default: false,
        }
    }

    /// Creates the default flow of a conditional branch.
    #[must_use]
    pub fn default_branch() -> Self {
        Self {
            condition: None,
            default: true,
        }
    }

    /// Returns true if the flow takes part in condition evaluation.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.condition.is_some() || self.default
    }
}
