//! Shared, read-mostly store of model versions.
//!
//! Task and event lookups are cached per `version~taskId[.eventId]` key and
//! computed once per key. Adding or removing any version clears the whole
//! cache. Lookups hand out clones, so callers may mutate what they receive.

use crate::definition::Model;
use crate::element::{ElementId, Event, Task};
use crate::error::ModelError;
use dashmap::DashMap;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use waymark_core::{Workitem, fields};

/// An event together with the graph element it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedEvent {
    pub element: ElementId,
    pub event: Event,
}

/// Holds every loaded model version.
///
/// Construct one per process and share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ModelStore {
    models: RwLock<HashMap<String, Arc<Model>>>,
    tasks: DashMap<String, Option<Task>>,
    events: DashMap<String, Option<LocatedEvent>>,
}

impl ModelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model, replacing any model with the same version.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidModel`] if the model fails validation.
    pub fn add_model(&self, model: Model) -> waymark_core::Result<(), ModelError> {
        model.validate()?;
        let version = model.version().to_string();
        let replaced = self
            .models
            .write()
            .insert(version.clone(), Arc::new(model))
            .is_some();
        self.clear_cache();
        info!(version = %version, replaced, "model added");
        Ok(())
    }

    /// Removes a model version and returns it.
    pub fn remove_model(&self, version: &str) -> Option<Arc<Model>> {
        let removed = self.models.write().remove(version);
        self.clear_cache();
        if removed.is_some() {
            info!(version, "model removed");
        }
        removed
    }

    /// Returns the model with exactly this version.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UndefinedModelVersion`] if no such model exists.
    pub fn model(&self, version: &str) -> Result<Arc<Model>, ModelError> {
        self.models
            .read()
            .get(version)
            .cloned()
            .ok_or_else(|| ModelError::UndefinedModelVersion {
                version: version.to_string(),
            })
    }

    /// Returns all versions, highest first.
    #[must_use]
    pub fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.models.read().keys().cloned().collect();
        sort_descending(&mut versions);
        versions
    }

    /// Returns the versions covering a workflow group, highest first.
    #[must_use]
    pub fn find_versions_by_group(&self, group: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .models
            .read()
            .values()
            .filter(|model| model.definition.has_group(group))
            .map(|model| model.version().to_string())
            .collect();
        sort_descending(&mut versions);
        versions
    }

    /// Returns the versions a pattern matches anywhere in, highest first.
    ///
    /// An invalid pattern matches nothing.
    #[must_use]
    pub fn find_versions_by_regex(&self, pattern: &str) -> Vec<String> {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(err) => {
                debug!(pattern, error = %err, "model version is not a valid pattern");
                return Vec::new();
            }
        };
        let mut versions: Vec<String> = self
            .models
            .read()
            .keys()
            .filter(|version| regex.is_match(version))
            .cloned()
            .collect();
        sort_descending(&mut versions);
        versions
    }

    /// Returns the model a workitem belongs to.
    ///
    /// Tries the exact `$modelversion`, then the highest version it matches
    /// as a pattern, then the highest version covering the workitem's
    /// workflow group. When resolved by pattern or group, `$modelversion` is
    /// rewritten to the resolved version.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UndefinedModelVersion`] if nothing matches.
    pub fn model_by_workitem(&self, workitem: &mut Workitem) -> Result<Arc<Model>, ModelError> {
        let version = workitem.model_version();
        if let Ok(model) = self.model(&version) {
            return Ok(model);
        }

        let by_pattern = if version.is_empty() {
            None
        } else {
            self.find_versions_by_regex(&version).into_iter().next()
        };
        if let Some(resolved) = by_pattern {
            info!(pattern = %version, resolved = %resolved, "model version resolved by pattern");
            workitem.replace_item_value(fields::MODEL_VERSION, resolved.as_str());
            return self.model(&resolved);
        }

        let group = workitem.workflow_group();
        let by_group = if group.is_empty() {
            None
        } else {
            self.find_versions_by_group(&group).into_iter().next()
        };
        if let Some(resolved) = by_group {
            warn!(
                version = %version,
                resolved = %resolved,
                group = %group,
                unique_id = %workitem.unique_id(),
                "deprecated model version, migrating by workflow group"
            );
            workitem.replace_item_value(fields::MODEL_VERSION, resolved.as_str());
            return self.model(&resolved);
        }

        Err(ModelError::UndefinedModelVersion { version })
    }

    /// Returns a copy of a task.
    #[must_use]
    pub fn task(&self, model: &Model, task_id: i64) -> Option<Task> {
        let key = format!("{}~{task_id}", model.version());
        self.tasks
            .entry(key)
            .or_insert_with(|| model.graph.find_task(task_id).map(|(_, task)| task.clone()))
            .value()
            .clone()
    }

    /// Returns a copy of an event fired from a task.
    ///
    /// The first event with a matching id among the task's events wins.
    #[must_use]
    pub fn event(&self, model: &Model, task_id: i64, event_id: i64) -> Option<LocatedEvent> {
        let key = format!("{}~{task_id}.{event_id}", model.version());
        self.events
            .entry(key)
            .or_insert_with(|| lookup_event(model, task_id, event_id))
            .value()
            .clone()
    }

    fn clear_cache(&self) {
        self.tasks.clear();
        self.events.clear();
    }
}

fn lookup_event(model: &Model, task_id: i64, event_id: i64) -> Option<LocatedEvent> {
    let (task_element, _) = model.graph.find_task(task_id)?;
    model
        .graph
        .task_events(task_element)
        .into_iter()
        .find_map(|element_id| {
            let event = model.graph.get_element(element_id)?.as_event()?;
            (event.id == event_id).then(|| LocatedEvent {
                element: element_id,
                event: event.clone(),
            })
        })
}

fn sort_descending(versions: &mut [String]) {
    versions.sort_unstable_by(|a, b| b.cmp(a));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ModelBuilder;

    fn model(version: &str, group: &str) -> Model {
        let mut builder = ModelBuilder::new(version);
        let open = builder.task(Task::new(100, "Open").with_group(group));
        let save = builder.event(open, Event::new(10, "Save"));
        builder.flow(save, open);
        builder.build().expect("model should build")
    }

    fn store(models: &[(&str, &str)]) -> ModelStore {
        let store = ModelStore::new();
        for (version, group) in models {
            store
                .add_model(model(version, group))
                .expect("model should be added");
        }
        store
    }

    #[test]
    fn exact_version_is_found() {
        let store = store(&[("1.0.0", "Invoice")]);
        assert_eq!(store.model("1.0.0").expect("model").version(), "1.0.0");
    }

    #[test]
    fn unknown_version_is_undefined() {
        let store = store(&[("1.0.0", "Invoice")]);
        let err = store.model("2.0.0").expect_err("should fail");
        assert!(matches!(err, ModelError::UndefinedModelVersion { .. }));
    }

    #[test]
    fn versions_are_sorted_descending() {
        let store = store(&[("1.0.0", "A"), ("1.2.0", "A"), ("1.1.0", "B")]);
        assert_eq!(store.versions(), vec!["1.2.0", "1.1.0", "1.0.0"]);
        assert_eq!(store.find_versions_by_group("A"), vec!["1.2.0", "1.0.0"]);
    }

    #[test]
    fn pattern_resolves_highest_match_and_rewrites_version() {
        let store = store(&[("invoice-1.0.0", "Invoice"), ("invoice-1.1.0", "Invoice")]);
        let mut workitem = Workitem::new().with_item(fields::MODEL_VERSION, "^invoice-1\\.");

        let model = store.model_by_workitem(&mut workitem).expect("model");
        assert_eq!(model.version(), "invoice-1.1.0");
        assert_eq!(workitem.model_version(), "invoice-1.1.0");
    }

    #[test]
    fn group_fallback_resolves_highest_version() {
        let store = store(&[("1.0.0", "Invoice"), ("2.0.0", "Invoice"), ("3.0.0", "Order")]);
        let mut workitem = Workitem::new()
            .with_item(fields::MODEL_VERSION, "0.9.0")
            .with_item(fields::WORKFLOW_GROUP, "Invoice");

        let model = store.model_by_workitem(&mut workitem).expect("model");
        assert_eq!(model.version(), "2.0.0");
        assert_eq!(workitem.model_version(), "2.0.0");
    }

    #[test]
    fn unresolvable_workitem_is_undefined() {
        let store = store(&[("1.0.0", "Invoice")]);
        let mut workitem = Workitem::new()
            .with_item(fields::MODEL_VERSION, "9.9.9")
            .with_item(fields::WORKFLOW_GROUP, "Order");

        let err = store.model_by_workitem(&mut workitem).expect_err("should fail");
        assert!(matches!(err, ModelError::UndefinedModelVersion { .. }));
        assert_eq!(workitem.model_version(), "9.9.9");
    }

    #[test]
    fn lookups_return_independent_copies() {
        let store = store(&[("1.0.0", "Invoice")]);
        let model = store.model("1.0.0").expect("model");

        let mut task = store.task(&model, 100).expect("task");
        task.name = "changed".to_string();
        assert_eq!(store.task(&model, 100).expect("task").name, "Open");

        let event = store.event(&model, 100, 10).expect("event");
        assert_eq!(event.event.name, "Save");
        assert!(store.event(&model, 100, 99).is_none());
    }

    #[test]
    fn replacing_a_version_clears_the_cache() {
        let store = store(&[("1.0.0", "Invoice")]);
        let old = store.model("1.0.0").expect("model");
        assert!(store.task(&old, 100).is_some());

        let mut builder = ModelBuilder::new("1.0.0");
        builder.task(Task::new(300, "Other"));
        store
            .add_model(builder.build().expect("model should build"))
            .expect("model should be added");

        let new = store.model("1.0.0").expect("model");
        assert!(store.task(&new, 100).is_none());
        assert!(store.task(&new, 300).is_some());
    }

    #[test]
    fn removed_versions_are_gone() {
        let store = store(&[("1.0.0", "Invoice")]);
        assert!(store.remove_model("1.0.0").is_some());
        assert!(store.model("1.0.0").is_err());
        assert!(store.remove_model("1.0.0").is_none());
    }

    #[test]
    fn concurrent_readers_share_cached_entries() {
        let store = Arc::new(store(&[("1.0.0", "Invoice")]));
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let model = store.model("1.0.0").expect("model");
                    for _ in 0..100 {
                        assert!(store.event(&model, 100, 10).is_some());
                    }
                });
            }
        });
        assert_eq!(store.events.len(), 1);
    }
}
