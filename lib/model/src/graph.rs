//! Model graph implementation using petgraph.
//!
//! Models are directed graphs where:
//! - Nodes are model elements (tasks, events, gateways, links, boundaries)
//! - Edges are sequence flows, optionally carrying a condition
//!
//! Cycles are legal; every walk over the graph is bounded by its caller.

use crate::element::{Element, ElementId, ElementKind, Task};
use crate::error::GraphError;
use crate::flow::SequenceFlow;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// A process model graph using petgraph's directed graph.
///
/// Serialized as element and flow lists; deserializing rebuilds the index
/// and rejects flows between unknown elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphData", into = "GraphData")]
pub struct ModelGraph {
    graph: DiGraph<Element, SequenceFlow>,
    /// Map from ElementId to petgraph's NodeIndex for O(1) lookup.
    index_map: HashMap<ElementId, NodeIndex>,
}

/// Flat wire form of a [`ModelGraph`]. Flows keep declaration order.
#[derive(Serialize, Deserialize)]
struct GraphData {
    elements: Vec<Element>,
    #[serde(default)]
    flows: Vec<(ElementId, ElementId, SequenceFlow)>,
}

impl ModelGraph {
    /// Creates a new empty model graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index_map: HashMap::new(),
        }
    }

    /// Adds an element to the graph and returns its ID.
    pub fn add_element(&mut self, element: Element) -> ElementId {
        let element_id = element.id;
        let index = self.graph.add_node(element);
        self.index_map.insert(element_id, index);
        element_id
    }

    /// Returns a reference to an element by its ID.
    #[must_use]
    pub fn get_element(&self, element_id: ElementId) -> Option<&Element> {
        let index = self.index_map.get(&element_id)?;
        self.graph.node_weight(*index)
    }

    /// Adds a sequence flow between two elements.
    ///
    /// # Errors
    ///
    /// Returns an error if either element doesn't exist.
    pub fn add_flow(
        &mut self,
        source_id: ElementId,
        target_id: ElementId,
        flow: SequenceFlow,
    ) -> Result<(), GraphError> {
        let source_index = self
            .index_map
            .get(&source_id)
            .ok_or(GraphError::ElementNotFound {
                element_id: source_id,
            })?;

        let target_index = self
            .index_map
            .get(&target_id)
            .ok_or(GraphError::ElementNotFound {
                element_id: target_id,
            })?;

        self.graph.add_edge(*source_index, *target_index, flow);
        Ok(())
    }

    /// Returns all elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.graph.node_weights()
    }

    /// Returns all tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = (ElementId, &Task)> {
        self.elements()
            .filter_map(|element| element.as_task().map(|task| (element.id, task)))
    }

    /// Returns the number of elements in the graph.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of flows in the graph.
    #[must_use]
    pub fn flow_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Finds the element of a task by its numeric id.
    #[must_use]
    pub fn find_task(&self, task_id: i64) -> Option<(ElementId, &Task)> {
        self.tasks().find(|(_, task)| task.id == task_id)
    }

    /// Finds the catch event of a link by name.
    #[must_use]
    pub fn find_link_catch(&self, name: &str) -> Option<ElementId> {
        self.elements()
            .find(|element| matches!(&element.kind, ElementKind::LinkCatch { name: n } if n == name))
            .map(|element| element.id)
    }

    /// Returns the boundary events attached to an element.
    pub fn boundaries_of(&self, element_id: ElementId) -> Vec<&Element> {
        self.elements()
            .filter(|element| {
                matches!(element.kind, ElementKind::Boundary { attached_to, .. } if attached_to == element_id)
            })
            .collect()
    }

    /// Returns the start markers of the graph.
    pub fn start_elements(&self) -> Vec<&Element> {
        self.elements()
            .filter(|element| matches!(element.kind, ElementKind::Start))
            .collect()
    }

    /// Returns the successors of an element in the order flows were added.
    pub fn outgoing(&self, element_id: ElementId) -> Vec<(&Element, &SequenceFlow)> {
        self.neighbors(element_id, Direction::Outgoing)
    }

    /// Returns the predecessors of an element in the order flows were added.
    pub fn incoming(&self, element_id: ElementId) -> Vec<(&Element, &SequenceFlow)> {
        self.neighbors(element_id, Direction::Incoming)
    }

    fn neighbors(
        &self,
        element_id: ElementId,
        direction: Direction,
    ) -> Vec<(&Element, &SequenceFlow)> {
        let Some(&index) = self.index_map.get(&element_id) else {
            return Vec::new();
        };

        // petgraph lists adjacent edges newest first
        let mut edges: Vec<_> = self.graph.edges_directed(index, direction).collect();
        edges.sort_by_key(|edge| edge.id());

        edges
            .into_iter()
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                let element = self.graph.node_weight(other)?;
                Some((element, edge.weight()))
            })
            .collect()
    }

    /// Returns the events a task can fire, nearest first.
    ///
    /// Walks the task's outgoing flows through gateways, links and follow-up
    /// events, then the flows leaving its boundary events, and finally adds
    /// initial events: events without incoming flows that enter the task.
    pub fn task_events(&self, task: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([task]);
        let mut queue: VecDeque<ElementId> = self
            .outgoing(task)
            .into_iter()
            .chain(
                self.boundaries_of(task)
                    .into_iter()
                    .flat_map(|boundary| self.outgoing(boundary.id)),
            )
            .map(|(element, _)| element.id)
            .collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(element) = self.get_element(id) else {
                continue;
            };
            match &element.kind {
                ElementKind::Task(_) | ElementKind::Start | ElementKind::End => continue,
                ElementKind::Event(_) => result.push(id),
                ElementKind::LinkThrow { name } => {
                    queue.extend(self.find_link_catch(name));
                    continue;
                }
                ElementKind::Gateway { .. }
                | ElementKind::LinkCatch { .. }
                | ElementKind::Boundary { .. } => {}
            }
            queue.extend(self.outgoing(id).into_iter().map(|(next, _)| next.id));
        }

        for (element, _) in self.incoming(task) {
            if element.is_event()
                && self.incoming(element.id).is_empty()
                && !result.contains(&element.id)
            {
                result.push(element.id);
            }
        }

        result
    }

    /// Validates the model graph.
    ///
    /// Checks:
    /// - Task ids are unique
    /// - Every link throw has a matching catch
    /// - Boundary events are attached to tasks
    ///
    /// # Errors
    ///
    /// Returns an error describing the first validation failure.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut task_ids = HashSet::new();
        for (_, task) in self.tasks() {
            if !task_ids.insert(task.id) {
                return Err(GraphError::DuplicateTaskId { task_id: task.id });
            }
        }

        for element in self.elements() {
            match &element.kind {
                ElementKind::LinkThrow { name } if self.find_link_catch(name).is_none() => {
                    return Err(GraphError::UnmatchedLink { name: name.clone() });
                }
                ElementKind::Boundary { attached_to, .. }
                    if !self.get_element(*attached_to).is_some_and(Element::is_task) =>
                {
                    return Err(GraphError::DetachedBoundary {
                        element_id: element.id,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl Default for ModelGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ModelGraph> for GraphData {
    fn from(model: ModelGraph) -> Self {
        let flows = model
            .graph
            .edge_references()
            .map(|edge| {
                (
                    model.graph[edge.source()].id,
                    model.graph[edge.target()].id,
                    edge.weight().clone(),
                )
            })
            .collect();
        let (nodes, _) = model.graph.into_nodes_edges();
        Self {
            elements: nodes.into_iter().map(|node| node.weight).collect(),
            flows,
        }
    }
}

impl TryFrom<GraphData> for ModelGraph {
    type Error = GraphError;

    fn try_from(data: GraphData) -> Result<Self, Self::Error> {
        let mut graph = Self::new();
        for element in data.elements {
            graph.add_element(element);
        }
        for (source, target, flow) in data.flows {
            graph.add_flow(source, target, flow)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Event, GatewayKind};

    fn task(id: i64) -> Element {
        Element::new(ElementKind::Task(Task::new(id, format!("Task {id}"))))
    }

    fn event(id: i64) -> Element {
        Element::new(ElementKind::Event(Event::new(id, format!("Event {id}"))))
    }

    #[test]
    fn add_and_get_element() {
        let mut graph = ModelGraph::new();
        let id = graph.add_element(task(100));

        let element = graph.get_element(id).expect("element should exist");
        assert_eq!(element.as_task().map(|t| t.id), Some(100));
        assert_eq!(graph.find_task(100).map(|(found, _)| found), Some(id));
    }

    #[test]
    fn add_flow_rejects_unknown_element() {
        let mut graph = ModelGraph::new();
        let id = graph.add_element(task(100));

        let result = graph.add_flow(id, ElementId::new(), SequenceFlow::plain());
        assert!(matches!(result, Err(GraphError::ElementNotFound { .. })));
    }

    #[test]
    fn outgoing_keeps_declaration_order() {
        let mut graph = ModelGraph::new();
        let gateway = graph.add_element(Element::new(ElementKind::Gateway {
            gateway: GatewayKind::Exclusive,
        }));
        let first = graph.add_element(task(1100));
        let second = graph.add_element(task(1200));
        graph
            .add_flow(gateway, first, SequenceFlow::conditional("_budget > 100"))
            .expect("flow");
        graph
            .add_flow(gateway, second, SequenceFlow::default_branch())
            .expect("flow");

        let ids: Vec<_> = graph
            .outgoing(gateway)
            .into_iter()
            .map(|(element, _)| element.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(graph.incoming(first).len(), 1);
    }

    #[test]
    fn task_events_include_follow_ups_and_initial_events() {
        let mut graph = ModelGraph::new();
        let open = graph.add_element(task(100));
        let closed = graph.add_element(task(200));
        let submit = graph.add_element(event(11));
        let approve = graph.add_element(event(20));
        let foreign = graph.add_element(event(30));
        let init = graph.add_element(event(1));
        graph.add_flow(open, submit, SequenceFlow::plain()).expect("flow");
        graph.add_flow(submit, approve, SequenceFlow::plain()).expect("flow");
        graph.add_flow(approve, closed, SequenceFlow::plain()).expect("flow");
        graph.add_flow(closed, foreign, SequenceFlow::plain()).expect("flow");
        graph.add_flow(init, open, SequenceFlow::plain()).expect("flow");

        assert_eq!(graph.task_events(open), vec![submit, approve, init]);
        assert_eq!(graph.task_events(closed), vec![foreign]);
    }

    #[test]
    fn validate_detects_duplicate_task_ids() {
        let mut graph = ModelGraph::new();
        graph.add_element(task(100));
        graph.add_element(task(100));

        assert_eq!(
            graph.validate(),
            Err(GraphError::DuplicateTaskId { task_id: 100 })
        );
    }

    #[test]
    fn validate_detects_unmatched_link() {
        let mut graph = ModelGraph::new();
        graph.add_element(Element::new(ElementKind::LinkThrow {
            name: "L1".to_string(),
        }));

        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnmatchedLink { .. })
        ));
    }

    #[test]
    fn validate_detects_detached_boundary() {
        let mut graph = ModelGraph::new();
        let target = graph.add_element(event(10));
        graph.add_element(Element::new(ElementKind::Boundary {
            attached_to: target,
            duration: None,
        }));

        assert!(matches!(
            graph.validate(),
            Err(GraphError::DetachedBoundary { .. })
        ));
    }

    #[test]
    fn cycles_are_valid() {
        let mut graph = ModelGraph::new();
        let first = graph.add_element(event(10));
        let second = graph.add_element(event(20));
        graph.add_flow(first, second, SequenceFlow::plain()).expect("flow");
        graph.add_flow(second, first, SequenceFlow::plain()).expect("flow");

        assert!(graph.validate().is_ok());
    }

    #[test]
    fn graph_serde_roundtrip() {
        let mut graph = ModelGraph::new();
        let task_id = graph.add_element(task(100));
        let event_id = graph.add_element(event(10));
        graph
            .add_flow(task_id, event_id, SequenceFlow::plain())
            .expect("flow");

        let json = serde_json::to_string(&graph).expect("serialize");
        let parsed: ModelGraph = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.element_count(), 2);
        assert_eq!(parsed.flow_count(), 1);
        assert_eq!(parsed.outgoing(task_id).len(), 1);
        assert_eq!(parsed.find_task(100).map(|(found, _)| found), Some(task_id));
    }

    #[test]
    fn deserialize_rejects_dangling_flows() {
        let mut graph = ModelGraph::new();
        let task_id = graph.add_element(task(100));
        let json = serde_json::json!({
            "elements": [graph.get_element(task_id).expect("element")],
            "flows": [[task_id, ElementId::new(), SequenceFlow::plain()]],
        });

        let err = serde_json::from_value::<ModelGraph>(json).expect_err("should fail");
        assert!(err.to_string().contains("element not found"));
    }
}
