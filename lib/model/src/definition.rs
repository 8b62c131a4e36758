//! Model definition types.
//!
//! A model is an immutable, versioned process description that consists of:
//! - Definition metadata (version, workflow groups, free items)
//! - A directed graph of elements
//!
//! Models are assembled with a [`ModelBuilder`] and validated on `build`.

use crate::element::{Element, ElementId, ElementKind, Event, GatewayKind, Task};
use crate::error::ModelError;
use crate::flow::SequenceFlow;
use crate::graph::ModelGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waymark_core::Workitem;

/// Metadata for a model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// The version string workitems refer to in `$modelversion`.
    pub version: String,
    /// Workflow groups covered by this version.
    pub groups: Vec<String>,
    /// Free definition items.
    #[serde(default)]
    pub items: Workitem,
}

impl ModelDefinition {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            groups: Vec::new(),
            items: Workitem::new(),
        }
    }

    /// Returns true if the version covers the given workflow group.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// A complete, validated process model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub definition: ModelDefinition,
    pub graph: ModelGraph,
}

impl Model {
    /// Returns the model version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.definition.version
    }

    /// Loads a model from its JSON form and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidModel`] if the document does not parse
    /// or the graph is invalid.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self =
            serde_json::from_str(json).map_err(|err| ModelError::invalid("", err.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        if self.definition.version.trim().is_empty() {
            return Err(ModelError::invalid("", "model version is empty"));
        }
        self.graph
            .validate()
            .map_err(|err| ModelError::invalid(self.version(), err.to_string()))
    }
}

/// Assembles a [`Model`].
///
/// Element-adding methods return the new element's ID for use in flows.
/// Flows are checked when the model is built.
#[derive(Debug)]
pub struct ModelBuilder {
    definition: ModelDefinition,
    elements: Vec<Element>,
    flows: Vec<(ElementId, ElementId, SequenceFlow)>,
}

impl ModelBuilder {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            definition: ModelDefinition::new(version),
            elements: Vec::new(),
            flows: Vec::new(),
        }
    }

    /// Declares a workflow group without adding a task to it.
    pub fn group(&mut self, group: impl Into<String>) -> &mut Self {
        let group = group.into();
        if !self.definition.has_group(&group) {
            self.definition.groups.push(group);
        }
        self
    }

    /// Sets a definition item.
    pub fn item(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.definition.items.replace_item_value(name, value);
        self
    }

    /// Adds a task. Its group is registered with the definition.
    pub fn task(&mut self, task: Task) -> ElementId {
        if !task.group.is_empty() {
            self.group(task.group.clone());
        }
        self.element(ElementKind::Task(task))
    }

    /// Adds an event fired from `source` (a task, or another event for a
    /// follow-up).
    pub fn event(&mut self, source: ElementId, event: Event) -> ElementId {
        let id = self.element(ElementKind::Event(event));
        self.flow(source, id);
        id
    }

    /// Adds an event without an incoming flow.
    ///
    /// An event like this addresses the task its outgoing flow enters, which
    /// is how initial events are modelled.
    pub fn detached_event(&mut self, event: Event) -> ElementId {
        self.element(ElementKind::Event(event))
    }

    pub fn exclusive_gateway(&mut self) -> ElementId {
        self.element(ElementKind::Gateway {
            gateway: GatewayKind::Exclusive,
        })
    }

    pub fn split_gateway(&mut self) -> ElementId {
        self.element(ElementKind::Gateway {
            gateway: GatewayKind::Split,
        })
    }

    pub fn link_throw(&mut self, name: impl Into<String>) -> ElementId {
        self.element(ElementKind::LinkThrow { name: name.into() })
    }

    pub fn link_catch(&mut self, name: impl Into<String>) -> ElementId {
        self.element(ElementKind::LinkCatch { name: name.into() })
    }

    pub fn start(&mut self) -> ElementId {
        self.element(ElementKind::Start)
    }

    pub fn end(&mut self) -> ElementId {
        self.element(ElementKind::End)
    }

    /// Attaches a timer boundary event to a task.
    pub fn boundary(&mut self, task: ElementId, duration: Option<&str>) -> ElementId {
        self.element(ElementKind::Boundary {
            attached_to: task,
            duration: duration.map(str::to_string),
        })
    }

    /// Adds an unconditional flow.
    pub fn flow(&mut self, source: ElementId, target: ElementId) -> &mut Self {
        self.flows.push((source, target, SequenceFlow::plain()));
        self
    }

    /// Adds a flow guarded by a condition script.
    pub fn conditional_flow(
        &mut self,
        source: ElementId,
        target: ElementId,
        condition: impl Into<String>,
    ) -> &mut Self {
        self.flows
            .push((source, target, SequenceFlow::conditional(condition)));
        self
    }

    /// Adds the default flow of a conditional branch.
    pub fn default_flow(&mut self, source: ElementId, target: ElementId) -> &mut Self {
        self.flows
            .push((source, target, SequenceFlow::default_branch()));
        self
    }

    /// Builds and validates the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidModel`] if a flow references an unknown
    /// element or the graph fails validation.
    pub fn build(self) -> Result<Model, ModelError> {
        let version = self.definition.version.clone();
        let mut graph = ModelGraph::new();
        for element in self.elements {
            graph.add_element(element);
        }
        for (source, target, flow) in self.flows {
            graph
                .add_flow(source, target, flow)
                .map_err(|err| ModelError::invalid(&version, err.to_string()))?;
        }

        let model = Model {
            definition: self.definition,
            graph,
        };
        model.validate()?;
        Ok(model)
    }

    fn element(&mut self, kind: ElementKind) -> ElementId {
        let element = Element::new(kind);
        let id = element.id;
        self.elements.push(element);
        id
    }
}
