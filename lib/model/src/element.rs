//! Model element types.
//!
//! A process model is a graph of elements. Tasks and events carry the
//! numeric ids workitems refer to; gateways, link events, boundary events
//! and start/end markers only shape the flow between them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;
use waymark_core::Workitem;

/// A unique identifier for an element within a model graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(Ulid);

impl ElementId {
    /// Creates a new random element ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "el_{}", self.0)
    }
}

/// A named state a workitem can rest in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Numeric task id, unique within a model version.
    pub id: i64,
    /// Display name, written to `$workflowstatus` on arrival.
    pub name: String,
    /// Workflow group the task belongs to.
    pub group: String,
    /// Free configuration consumed by plugins.
    #[serde(default)]
    pub items: Workitem,
}

impl Task {
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            group: String::new(),
            items: Workitem::new(),
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    #[must_use]
    pub fn with_item(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.items.replace_item_value(name, value);
        self
    }
}

/// A named transition leaving a task.
///
/// The same event element may be reachable from several tasks; its id is
/// unique per source task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    /// Free configuration consumed by plugins and the kernel.
    #[serde(default)]
    pub items: Workitem,
}

impl Event {
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            items: Workitem::new(),
        }
    }

    #[must_use]
    pub fn with_item(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.items.replace_item_value(name, value);
        self
    }
}

/// Gateway behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Exactly one outgoing flow is taken, chosen by its condition.
    Exclusive,
    /// One flow into a task continues the workitem; every flow into an
    /// event produces a new version of it.
    Split,
}

/// The role an element plays in the model graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Start,
    End,
    Task(Task),
    Event(Event),
    Gateway {
        gateway: GatewayKind,
    },
    /// Throw side of a link; continues at the catch with the same name.
    LinkThrow {
        name: String,
    },
    LinkCatch {
        name: String,
    },
    /// A timer attached to a task, leading to the event fired on timeout.
    Boundary {
        attached_to: ElementId,
        /// Raw timer duration as modelled; parsed by the navigator.
        duration: Option<String>,
    },
}

/// An element of a model graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
}

impl Element {
    /// Creates a new element with a fresh ID.
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: ElementId::new(),
            kind,
        }
    }

    #[must_use]
    pub fn as_task(&self) -> Option<&Task> {
        match &self.kind {
            ElementKind::Task(task) => Some(task),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_event(&self) -> Option<&Event> {
        match &self.kind {
            ElementKind::Event(event) => Some(event),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_task(&self) -> bool {
        matches!(self.kind, ElementKind::Task(_))
    }

    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(self.kind, ElementKind::Event(_))
    }

    #[must_use]
    pub fn is_gateway(&self) -> bool {
        matches!(self.kind, ElementKind::Gateway { .. })
    }
}
