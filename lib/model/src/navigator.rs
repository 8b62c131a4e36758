//! Graph resolution over a process model.
//!
//! The navigator locates the task and event a workitem addresses and
//! computes where firing that event leads. Every walk carries its own
//! visited set; reaching an element twice abandons that branch.

use crate::definition::Model;
use crate::element::{Element, ElementId, ElementKind, Event, GatewayKind, Task};
use crate::error::ModelError;
use crate::graph::ModelGraph;
use crate::store::ModelStore;
use petgraph::Direction;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use waymark_core::Workitem;
use waymark_rules::RuleEvaluator;

/// Where firing an event leads.
#[derive(Debug, Clone, PartialEq)]
pub enum NextElement {
    /// The workitem comes to rest at this task.
    ArriveAtTask(Task),
    /// The workitem stays at its task and fires this event next.
    ContinueAtEvent(Event),
}

/// The outcome of [`ModelNavigator::resolve_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationResult {
    pub next: NextElement,
    /// Events reached through a split gateway; each yields a new version.
    pub split_events: Vec<Event>,
}

/// Timeout metadata of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryTimer {
    /// The event fired when the timer elapses.
    pub event: Event,
    /// Timer duration, if one is modelled and numeric.
    pub duration: Option<i64>,
}

/// Resolves tasks and events against the models of a [`ModelStore`].
#[derive(Clone)]
pub struct ModelNavigator {
    store: Arc<ModelStore>,
    rules: Arc<dyn RuleEvaluator>,
}

impl std::fmt::Debug for ModelNavigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelNavigator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ModelNavigator {
    #[must_use]
    pub fn new(store: Arc<ModelStore>, rules: Arc<dyn RuleEvaluator>) -> Self {
        Self { store, rules }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Returns the task and the event fired from it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UndefinedModelVersion`] for an unknown version
    /// and [`ModelError::UndefinedModelEntry`] if the task or event is
    /// missing.
    pub fn resolve_current(
        &self,
        version: &str,
        task_id: i64,
        event_id: i64,
    ) -> Result<(Task, Event), ModelError> {
        let model = self.store.model(version)?;
        let task = self
            .store
            .task(&model, task_id)
            .ok_or_else(|| undefined(version, task_id, None))?;
        let located = self
            .store
            .event(&model, task_id, event_id)
            .ok_or_else(|| undefined(version, task_id, Some(event_id)))?;
        Ok((task, located.event))
    }

    /// Computes where firing `event` from `task_id` leads.
    ///
    /// Conditional flows are evaluated in declared order with the default
    /// flow last. Link throws continue at the matching catch. An event
    /// that leads nowhere inherits the nearest task upstream of it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidModel`] if a conditional branch has no
    /// matching flow, a split gateway has no master task, or no task can be
    /// found at all.
    pub fn resolve_next(
        &self,
        version: &str,
        task_id: i64,
        event: &Event,
        workitem: &Workitem,
    ) -> Result<NavigationResult, ModelError> {
        let model = self.store.model(version)?;
        let located = self
            .store
            .event(&model, task_id, event.id)
            .ok_or_else(|| undefined(version, task_id, Some(event.id)))?;

        let mut walk = Walk {
            model: &model,
            workitem,
            rules: self.rules.as_ref(),
            visited: HashSet::new(),
            split_events: Vec::new(),
        };
        let target = match walk.next_from(located.element)? {
            Some(target) => target,
            None => inherited_task(&model.graph, located.element, task_id).ok_or_else(|| {
                ModelError::invalid(
                    version,
                    format!("event {task_id}.{} leads to no task", event.id),
                )
            })?,
        };

        let element = model
            .graph
            .get_element(target)
            .ok_or_else(|| ModelError::invalid(version, format!("element {target} vanished")))?;
        let next = match &element.kind {
            ElementKind::Event(next_event) => NextElement::ContinueAtEvent(next_event.clone()),
            ElementKind::Task(task) => NextElement::ArriveAtTask(task.clone()),
            _ => {
                return Err(ModelError::invalid(
                    version,
                    format!("element {target} is neither a task nor an event"),
                ));
            }
        };
        debug!(version, task_id, event_id = event.id, ?next, "resolved next element");

        Ok(NavigationResult {
            next,
            split_events: walk.split_events,
        })
    }

    /// Returns the timeout event of a task and its duration.
    ///
    /// Uses the first boundary event attached to the task that reaches an
    /// event. A missing or non-numeric duration is reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the version or the task is unknown.
    pub fn boundary_timer(
        &self,
        version: &str,
        task_id: i64,
    ) -> Result<Option<BoundaryTimer>, ModelError> {
        let model = self.store.model(version)?;
        let (task_element, _) = model
            .graph
            .find_task(task_id)
            .ok_or_else(|| undefined(version, task_id, None))?;

        for boundary in model.graph.boundaries_of(task_element) {
            let ElementKind::Boundary { duration, .. } = &boundary.kind else {
                continue;
            };
            let Some(event) = reachable(&model.graph, boundary.id, Direction::Outgoing, Element::is_event)
                .into_iter()
                .find_map(|id| model.graph.get_element(id)?.as_event().cloned())
            else {
                continue;
            };

            let duration = duration.as_deref().and_then(|raw| match raw.trim().parse() {
                Ok(millis) => Some(millis),
                Err(_) => {
                    warn!(version, task_id, duration = raw, "boundary timer duration is not numeric");
                    None
                }
            });
            return Ok(Some(BoundaryTimer { event, duration }));
        }

        Ok(None)
    }

    /// Returns every event a task can fire, nearest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the version or the task is unknown.
    pub fn find_events_by_task(&self, version: &str, task_id: i64) -> Result<Vec<Event>, ModelError> {
        let model = self.store.model(version)?;
        let (task_element, _) = model
            .graph
            .find_task(task_id)
            .ok_or_else(|| undefined(version, task_id, None))?;

        Ok(model
            .graph
            .task_events(task_element)
            .into_iter()
            .filter_map(|id| model.graph.get_element(id)?.as_event().cloned())
            .collect())
    }

    /// Returns the tasks of a workflow group reached from a start marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is unknown.
    pub fn find_start_tasks(&self, version: &str, group: &str) -> Result<Vec<Task>, ModelError> {
        let model = self.store.model(version)?;
        let mut tasks: Vec<Task> = Vec::new();
        for start in model.graph.start_elements() {
            for id in reachable(&model.graph, start.id, Direction::Outgoing, Element::is_task) {
                let Some(task) = model.graph.get_element(id).and_then(Element::as_task) else {
                    continue;
                };
                if task.group == group && !tasks.iter().any(|t| t.id == task.id) {
                    tasks.push(task.clone());
                }
            }
        }
        Ok(tasks)
    }
}

/// State of one `resolve_next` walk.
struct Walk<'a> {
    model: &'a Model,
    workitem: &'a Workitem,
    rules: &'a dyn RuleEvaluator,
    visited: HashSet<ElementId>,
    split_events: Vec<Event>,
}

impl Walk<'_> {
    fn next_from(&mut self, from: ElementId) -> Result<Option<ElementId>, ModelError> {
        if !self.visited.insert(from) {
            return Ok(None);
        }
        for target in self.select_flows(from)? {
            if let Some(found) = self.enter(target)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn enter(&mut self, id: ElementId) -> Result<Option<ElementId>, ModelError> {
        let Some(element) = self.model.graph.get_element(id) else {
            return Ok(None);
        };
        match &element.kind {
            ElementKind::Task(_) | ElementKind::Event(_) => Ok(Some(id)),
            ElementKind::LinkThrow { name } => match self.model.graph.find_link_catch(name) {
                Some(catch) => {
                    debug!(link = %name, "following link");
                    self.next_from(catch)
                }
                None => Ok(None),
            },
            ElementKind::Gateway {
                gateway: GatewayKind::Split,
            } => self.split(id),
            ElementKind::Gateway {
                gateway: GatewayKind::Exclusive,
            }
            | ElementKind::LinkCatch { .. }
            | ElementKind::Boundary { .. } => self.next_from(id),
            ElementKind::Start | ElementKind::End => Ok(None),
        }
    }

    /// Picks the flows to follow out of an element.
    ///
    /// Without conditional or default flows every flow is a candidate.
    /// Otherwise plain and conditional flows are tried in declared order
    /// and the default flow last; exactly one is returned.
    fn select_flows(&self, from: ElementId) -> Result<Vec<ElementId>, ModelError> {
        let outgoing = self.model.graph.outgoing(from);
        if !outgoing.iter().any(|(_, flow)| flow.is_branch()) {
            return Ok(outgoing.into_iter().map(|(target, _)| target.id).collect());
        }

        for (target, flow) in outgoing.iter().filter(|(_, flow)| !flow.default) {
            if flow.condition.as_deref().is_none_or(|c| self.holds(c)) {
                return Ok(vec![target.id]);
            }
        }
        if let Some((target, _)) = outgoing.iter().find(|(_, flow)| flow.default) {
            return Ok(vec![target.id]);
        }

        Err(ModelError::invalid(
            self.model.version(),
            format!("no condition matched at element {from}"),
        ))
    }

    /// The first holding flow into a task continues the workitem; every
    /// holding flow into an event becomes a split version.
    fn split(&mut self, gateway: ElementId) -> Result<Option<ElementId>, ModelError> {
        if !self.visited.insert(gateway) {
            return Ok(None);
        }

        let mut master = None;
        for (target, flow) in self.model.graph.outgoing(gateway) {
            if !flow.condition.as_deref().is_none_or(|c| self.holds(c)) {
                continue;
            }
            match &target.kind {
                ElementKind::Event(event) => self.split_events.push(event.clone()),
                ElementKind::Task(_) if master.is_none() => master = Some(target.id),
                _ => {}
            }
        }

        master.map(Some).ok_or_else(|| {
            ModelError::invalid(
                self.model.version(),
                format!("split gateway {gateway} has no valid master task"),
            )
        })
    }

    fn holds(&self, condition: &str) -> bool {
        match self.rules.evaluate_boolean(condition, self.workitem) {
            Ok(value) => value,
            Err(err) => {
                warn!(condition, error = %err, "failed to evaluate condition");
                false
            }
        }
    }
}

/// Finds the task an event without a downstream target falls back to.
///
/// Prefers the task the event was fired from when it is among the nearest
/// upstream tasks.
fn inherited_task(graph: &ModelGraph, event: ElementId, task_id: i64) -> Option<ElementId> {
    let candidates = reachable(graph, event, Direction::Incoming, Element::is_task);
    candidates
        .iter()
        .copied()
        .find(|id| {
            graph
                .get_element(*id)
                .and_then(Element::as_task)
                .is_some_and(|task| task.id == task_id)
        })
        .or_else(|| candidates.first().copied())
}

/// Breadth-first walk that stops at elements accepted by `stop` and at
/// tasks. Returns the accepted elements, nearest first.
fn reachable(
    graph: &ModelGraph,
    from: ElementId,
    direction: Direction,
    stop: impl Fn(&Element) -> bool,
) -> Vec<ElementId> {
    let step = |id: ElementId| match direction {
        Direction::Outgoing => graph.outgoing(id),
        Direction::Incoming => graph.incoming(id),
    };

    let mut result = Vec::new();
    let mut visited = HashSet::from([from]);
    let mut queue: VecDeque<ElementId> = step(from).into_iter().map(|(e, _)| e.id).collect();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(element) = graph.get_element(id) else {
            continue;
        };
        if stop(element) {
            result.push(id);
            continue;
        }
        match &element.kind {
            ElementKind::Task(_) => {}
            ElementKind::LinkThrow { name } if direction == Direction::Outgoing => {
                queue.extend(graph.find_link_catch(name));
            }
            _ => queue.extend(step(id).into_iter().map(|(e, _)| e.id)),
        }
    }

    result
}

fn undefined(version: &str, task_id: i64, event_id: Option<i64>) -> ModelError {
    ModelError::UndefinedModelEntry {
        version: version.to_string(),
        task_id,
        event_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ModelBuilder;
    use waymark_core::fields;
    use waymark_rules::ExpressionEngine;

    fn navigator(builder: ModelBuilder) -> ModelNavigator {
        let store = Arc::new(ModelStore::new());
        store
            .add_model(builder.build().expect("model should build"))
            .expect("model should be added");
        ModelNavigator::new(store, Arc::new(ExpressionEngine::new()))
    }

    fn next_task(result: &NavigationResult) -> i64 {
        match &result.next {
            NextElement::ArriveAtTask(task) => task.id,
            NextElement::ContinueAtEvent(event) => panic!("expected a task, got event {}", event.id),
        }
    }

    fn budget(value: i64) -> Workitem {
        Workitem::new().with_item("_budget", value)
    }

    /// 1000 --10--> gateway --(_budget > 100)--> 1100, default --> 1200
    fn approval() -> ModelBuilder {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(1000, "Open"));
        let review = builder.task(Task::new(1100, "Review"));
        let approved = builder.task(Task::new(1200, "Approved"));
        let submit = builder.event(open, Event::new(10, "Submit"));
        let gateway = builder.exclusive_gateway();
        builder
            .flow(submit, gateway)
            .conditional_flow(gateway, review, "_budget > 100")
            .default_flow(gateway, approved);
        builder
    }

    #[test]
    fn resolves_current_task_and_event() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let save = builder.event(open, Event::new(10, "Save"));
        builder.flow(save, open);
        let navigator = navigator(builder);

        let (task, event) = navigator.resolve_current("1.0.0", 100, 10).expect("entry");
        assert_eq!(task.name, "Open");
        assert_eq!(event.name, "Save");

        let err = navigator.resolve_current("1.0.0", 100, 99).expect_err("should fail");
        assert!(matches!(
            err,
            ModelError::UndefinedModelEntry {
                event_id: Some(99),
                ..
            }
        ));
        let err = navigator.resolve_current("1.0.0", 300, 10).expect_err("should fail");
        assert!(matches!(err, ModelError::UndefinedModelEntry { event_id: None, .. }));
    }

    #[test]
    fn conditional_branch_follows_matching_flow() {
        let navigator = navigator(approval());
        let (_, submit) = navigator.resolve_current("1.0.0", 1000, 10).expect("entry");

        let high = navigator
            .resolve_next("1.0.0", 1000, &submit, &budget(500))
            .expect("next");
        assert_eq!(next_task(&high), 1100);

        let low = navigator
            .resolve_next("1.0.0", 1000, &submit, &budget(50))
            .expect("next");
        assert_eq!(next_task(&low), 1200);
    }

    #[test]
    fn failing_condition_counts_as_false() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(1000, "Open"));
        let review = builder.task(Task::new(1100, "Review"));
        let approved = builder.task(Task::new(1200, "Approved"));
        let submit = builder.event(open, Event::new(10, "Submit"));
        let gateway = builder.exclusive_gateway();
        builder
            .flow(submit, gateway)
            .conditional_flow(gateway, review, "_budget >")
            .default_flow(gateway, approved);
        let navigator = navigator(builder);
        let (_, submit) = navigator.resolve_current("1.0.0", 1000, 10).expect("entry");

        let result = navigator
            .resolve_next("1.0.0", 1000, &submit, &budget(500))
            .expect("next");
        assert_eq!(next_task(&result), 1200);
    }

    #[test]
    fn unmatched_branch_without_default_is_invalid() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(1000, "Open"));
        let review = builder.task(Task::new(1100, "Review"));
        let submit = builder.event(open, Event::new(10, "Submit"));
        let gateway = builder.exclusive_gateway();
        builder
            .flow(submit, gateway)
            .conditional_flow(gateway, review, "_budget > 100");
        let navigator = navigator(builder);
        let (_, submit) = navigator.resolve_current("1.0.0", 1000, 10).expect("entry");

        let err = navigator
            .resolve_next("1.0.0", 1000, &submit, &budget(1))
            .expect_err("should fail");
        assert!(matches!(err, ModelError::InvalidModel { .. }));
    }

    #[test]
    fn follow_up_event_continues_at_event() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let closed = builder.task(Task::new(200, "Closed"));
        let prepare = builder.event(open, Event::new(11, "Prepare"));
        let close = builder.event(prepare, Event::new(20, "Close"));
        builder.flow(close, closed);
        let navigator = navigator(builder);
        let (_, prepare) = navigator.resolve_current("1.0.0", 100, 11).expect("entry");

        let result = navigator
            .resolve_next("1.0.0", 100, &prepare, &Workitem::new())
            .expect("next");
        assert!(matches!(
            result.next,
            NextElement::ContinueAtEvent(Event { id: 20, .. })
        ));
        assert!(navigator.resolve_current("1.0.0", 100, 20).is_ok());
    }

    #[test]
    fn link_events_jump_to_their_catch() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let archived = builder.task(Task::new(900, "Archived"));
        let archive = builder.event(open, Event::new(90, "Archive"));
        let throw = builder.link_throw("archive");
        let catch = builder.link_catch("archive");
        builder.flow(archive, throw).flow(catch, archived);
        let navigator = navigator(builder);
        let (_, archive) = navigator.resolve_current("1.0.0", 100, 90).expect("entry");

        let result = navigator
            .resolve_next("1.0.0", 100, &archive, &Workitem::new())
            .expect("next");
        assert_eq!(next_task(&result), 900);
    }

    #[test]
    fn dead_end_event_stays_at_its_task() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let cancel = builder.event(open, Event::new(99, "Cancel"));
        let end = builder.end();
        builder.flow(cancel, end);
        let navigator = navigator(builder);
        let (_, cancel) = navigator.resolve_current("1.0.0", 100, 99).expect("entry");

        let result = navigator
            .resolve_next("1.0.0", 100, &cancel, &Workitem::new())
            .expect("next");
        assert_eq!(next_task(&result), 100);
    }

    #[test]
    fn split_gateway_reports_master_and_split_events() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let closed = builder.task(Task::new(200, "Closed"));
        let submit = builder.event(open, Event::new(10, "Submit"));
        let split = builder.split_gateway();
        let archive = builder.detached_event(Event::new(30, "Archive"));
        let skipped = builder.detached_event(Event::new(40, "Skipped"));
        builder
            .flow(submit, split)
            .flow(split, closed)
            .flow(split, archive)
            .conditional_flow(split, skipped, "_budget > 100")
            .flow(archive, open)
            .flow(skipped, open);
        let navigator = navigator(builder);
        let (_, submit) = navigator.resolve_current("1.0.0", 100, 10).expect("entry");

        let result = navigator
            .resolve_next("1.0.0", 100, &submit, &budget(1))
            .expect("next");
        assert_eq!(next_task(&result), 200);
        let ids: Vec<i64> = result.split_events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![30]);
    }

    #[test]
    fn split_gateway_without_master_is_invalid() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let submit = builder.event(open, Event::new(10, "Submit"));
        let split = builder.split_gateway();
        let archive = builder.detached_event(Event::new(30, "Archive"));
        builder.flow(submit, split).flow(split, archive).flow(archive, open);
        let navigator = navigator(builder);
        let (_, submit) = navigator.resolve_current("1.0.0", 100, 10).expect("entry");

        let err = navigator
            .resolve_next("1.0.0", 100, &submit, &Workitem::new())
            .expect_err("should fail");
        assert!(err.to_string().contains("no valid master task"));
    }

    #[test]
    fn boundary_timer_reports_event_and_duration() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let expired = builder.task(Task::new(800, "Expired"));
        let boundary = builder.boundary(open, Some("60000"));
        let timeout = builder.event(boundary, Event::new(80, "Timeout"));
        builder.flow(timeout, expired);
        let navigator = navigator(builder);

        let timer = navigator
            .boundary_timer("1.0.0", 100)
            .expect("lookup")
            .expect("timer");
        assert_eq!(timer.event.id, 80);
        assert_eq!(timer.duration, Some(60_000));
        assert!(navigator.boundary_timer("1.0.0", 800).expect("lookup").is_none());
    }

    #[test]
    fn non_numeric_duration_is_none() {
        let mut builder = ModelBuilder::new("1.0.0");
        let open = builder.task(Task::new(100, "Open"));
        let boundary = builder.boundary(open, Some("PT1H"));
        let timeout = builder.event(boundary, Event::new(80, "Timeout"));
        builder.flow(timeout, open);
        let navigator = navigator(builder);

        let timer = navigator
            .boundary_timer("1.0.0", 100)
            .expect("lookup")
            .expect("timer");
        assert_eq!(timer.duration, None);
    }

    #[test]
    fn lists_events_and_start_tasks() {
        let mut builder = ModelBuilder::new("1.0.0");
        let start = builder.start();
        let open = builder.task(Task::new(100, "Open").with_group("Invoice"));
        let order = builder.task(Task::new(500, "Order").with_group("Order"));
        let save = builder.event(open, Event::new(10, "Save"));
        let submit = builder.event(open, Event::new(20, "Submit"));
        builder
            .flow(start, open)
            .flow(start, order)
            .flow(save, open)
            .flow(submit, open);
        let navigator = navigator(builder);

        let ids: Vec<i64> = navigator
            .find_events_by_task("1.0.0", 100)
            .expect("events")
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![10, 20]);

        let starts = navigator.find_start_tasks("1.0.0", "Invoice").expect("tasks");
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].id, 100);
        assert!(navigator.find_start_tasks("1.0.0", "Unknown").expect("tasks").is_empty());
    }

    #[test]
    fn unknown_version_is_reported() {
        let navigator = navigator(approval());
        let mut workitem = Workitem::new().with_item(fields::MODEL_VERSION, "2.0.0");
        assert!(navigator.store().model_by_workitem(&mut workitem).is_err());
        assert!(matches!(
            navigator.find_events_by_task("2.0.0", 1000),
            Err(ModelError::UndefinedModelVersion { .. })
        ));
    }
}
