//! The workflow kernel.
//!
//! `process` fires the event a workitem addresses, runs the plugin chain,
//! writes the transition bookkeeping and keeps going while follow-up or
//! queued events remain. Plugins are closed after each chain, with
//! [`CloseStatus::Error`] if the chain failed. `process` works on a copy:
//! on failure the caller's workitem is untouched and no split versions are
//! kept.

use crate::config::KernelConfig;
use crate::error::{KernelError, PluginError, ProcessingError};
use crate::event_log::{self, LogEntry};
use crate::plugin::{CloseStatus, KernelContext, Plugin, PluginRegistry};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use waymark_core::fields::{self, legacy};
use waymark_core::{TransactionId, Workitem, WorkitemId};
use waymark_model::{Event, ModelError, ModelNavigator, ModelStore, NextElement, Task};
use waymark_rules::RuleEvaluator;

/// Maximum number of events chained within one call.
pub const MAX_EVENT_HOPS: usize = 256;

/// Task item copied to the workitem's `type` field on arrival.
pub const TASK_TYPE_ITEM: &str = "application.type";

/// Event items that move a workitem to another model version.
pub const MODEL_VERSION_ITEM: &str = "model.version";
pub const MODEL_EVENT_ITEM: &str = "model.event";
pub const MODEL_TASK_ITEM: &str = "model.task";

/// State shared by every transition of one `process` call, split versions
/// included.
#[derive(Debug, Default)]
struct Transaction {
    hops: usize,
}

/// Tracks the `task.event` edges processed for one workitem.
#[derive(Debug, Default)]
struct EdgeHistory {
    edges: Vec<String>,
}

impl EdgeHistory {
    fn enter(&mut self, hops: &mut usize, task_id: i64, event_id: i64) -> Result<(), ProcessingError> {
        *hops += 1;
        if *hops > MAX_EVENT_HOPS {
            return Err(ProcessingError::HopLimitExceeded {
                limit: MAX_EVENT_HOPS,
            });
        }
        let edge = format!("{task_id}.{event_id}");
        if self.edges.contains(&edge) {
            return Err(ProcessingError::LoopDetected {
                edge,
                history: self.edges.clone(),
            });
        }
        self.edges.push(edge);
        Ok(())
    }
}

/// Advances workitems through the models of a shared [`ModelStore`].
///
/// A kernel owns its plugins and is used by one caller at a time; create
/// one kernel per thread and share the store.
#[derive(Debug)]
pub struct WorkflowKernel {
    context: KernelContext,
    navigator: ModelNavigator,
    registry: PluginRegistry,
    split_workitems: Vec<Workitem>,
}

impl WorkflowKernel {
    /// Creates a kernel with the default configuration.
    #[must_use]
    pub fn new(store: Arc<ModelStore>, rules: Arc<dyn RuleEvaluator>) -> Self {
        Self::with_config(store, rules, KernelConfig::default())
    }

    #[must_use]
    pub fn with_config(
        store: Arc<ModelStore>,
        rules: Arc<dyn RuleEvaluator>,
        config: KernelConfig,
    ) -> Self {
        let navigator = ModelNavigator::new(Arc::clone(&store), Arc::clone(&rules));
        Self {
            context: KernelContext {
                store,
                rules,
                user_id: None,
                config,
            },
            navigator,
            registry: PluginRegistry::new(),
            split_workitems: Vec::new(),
        }
    }

    /// Sets the user written to commented event log entries.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn context(&self) -> &KernelContext {
        &self.context
    }

    #[must_use]
    pub fn navigator(&self) -> &ModelNavigator {
        &self.navigator
    }

    /// Appends a plugin to the chain.
    pub fn register_plugin(&mut self, plugin: impl Plugin + 'static) {
        self.registry.register(Box::new(plugin));
    }

    /// Removes the first plugin of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotRegistered`] if no plugin has this type.
    pub fn unregister_plugin(&mut self, plugin_type: &str) -> Result<Box<dyn Plugin>, PluginError> {
        self.registry.unregister(plugin_type)
    }

    pub fn unregister_all_plugins(&mut self) {
        self.registry.clear();
    }

    #[must_use]
    pub fn plugin_registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Split versions created by the last `process` call.
    #[must_use]
    pub fn split_workitems(&self) -> &[Workitem] {
        &self.split_workitems
    }

    /// Fires the workitem's event and returns the advanced workitem.
    ///
    /// # Errors
    ///
    /// Returns an error if the workitem does not address a task and event,
    /// the model cannot be resolved, a plugin fails, or events loop.
    #[instrument(
        skip(self, workitem),
        fields(task_id = workitem.task_id(), event_id = workitem.event_id())
    )]
    pub fn process(&mut self, workitem: &Workitem) -> Result<Workitem, KernelError> {
        validate(workitem)?;
        self.split_workitems.clear();

        let mut working = workitem.clone();
        if working.unique_id().is_empty() {
            working.replace_item_value(fields::UNIQUE_ID, WorkitemId::new().to_string());
        }
        if working.item_value_string(fields::WORKITEM_ID).is_empty() {
            working.replace_item_value(fields::WORKITEM_ID, WorkitemId::new().to_string());
        }
        working.replace_item_value(fields::TRANSACTION_ID, TransactionId::new().to_string());
        working.replace_item_value(fields::LAST_TASK, working.task_id());

        let mut transaction = Transaction::default();
        match self.run_transitions(&mut working, &mut transaction) {
            Ok(()) => {
                info!(
                    unique_id = %working.unique_id(),
                    task_id = working.task_id(),
                    runs = working.runs(),
                    splits = self.split_workitems.len(),
                    "workitem processed"
                );
                Ok(working)
            }
            Err(err) => {
                warn!(error = %err, "processing rolled back");
                self.split_workitems.clear();
                Err(err)
            }
        }
    }

    /// Returns the task the workitem would arrive at, without changing it.
    ///
    /// Follows chained events, `$activityidlist` and model switches the way
    /// `process` does. No plugins run and nothing is written.
    ///
    /// # Errors
    ///
    /// Same resolution and loop errors as [`process`](Self::process).
    #[instrument(
        skip(self, workitem),
        fields(task_id = workitem.task_id(), event_id = workitem.event_id())
    )]
    pub fn eval(&self, workitem: &Workitem) -> Result<Task, KernelError> {
        validate(workitem)?;
        let mut working = workitem.clone();
        let mut history = EdgeHistory::default();
        let mut hops = 0;
        let mut arrived = None;

        while working.event_id() > 0 {
            let task_id = working.task_id();
            let event_id = working.event_id();
            history.enter(&mut hops, task_id, event_id)?;

            let model = self.context.store.model_by_workitem(&mut working)?;
            let (_, event) = self.navigator.resolve_current(model.version(), task_id, event_id)?;
            let navigation = self
                .navigator
                .resolve_next(model.version(), task_id, &event, &working)?;
            match navigation.next {
                NextElement::ArriveAtTask(task) => {
                    working.set_task_id(task.id);
                    advance_event_queue(&mut working);
                    arrived = Some(task);
                }
                NextElement::ContinueAtEvent(next) => {
                    working.set_event_id(next.id);
                }
            }
            switch_model(&mut working, &event, model.version())?;
        }

        arrived.ok_or_else(|| {
            ProcessingError::InvalidWorkitem {
                reason: format!("events from task {} lead to no task", workitem.task_id()),
            }
            .into()
        })
    }

    fn run_transitions(
        &mut self,
        workitem: &mut Workitem,
        transaction: &mut Transaction,
    ) -> Result<(), KernelError> {
        let mut history = EdgeHistory::default();
        while workitem.event_id() > 0 {
            self.transition(workitem, transaction, &mut history)?;
        }
        Ok(())
    }

    fn transition(
        &mut self,
        workitem: &mut Workitem,
        transaction: &mut Transaction,
        history: &mut EdgeHistory,
    ) -> Result<(), KernelError> {
        let task_id = workitem.task_id();
        let event_id = workitem.event_id();
        history.enter(&mut transaction.hops, task_id, event_id)?;

        let model = self.context.store.model_by_workitem(workitem)?;
        let version = model.version().to_string();
        let (_, event) = self.navigator.resolve_current(&version, task_id, event_id)?;
        let navigation = self
            .navigator
            .resolve_next(&version, task_id, &event, workitem)?;

        workitem.replace_item_value(fields::LAST_EVENT_DATE, Utc::now().to_rfc3339());
        let mut entered = 0;
        let chained = self
            .registry
            .run_chain(&self.context, workitem.clone(), &event, &mut entered);
        let status = if chained.is_ok() {
            CloseStatus::Success
        } else {
            CloseStatus::Error
        };
        self.registry.close(entered, status);
        *workitem = chained?;

        let next_task_id = match &navigation.next {
            NextElement::ArriveAtTask(task) => task.id,
            NextElement::ContinueAtEvent(_) => task_id,
        };
        let entry = LogEntry::now(
            self.context.config.log_timestamps_utc,
            &version,
            task_id,
            event_id,
            next_task_id,
        );
        let line = event_log::append(workitem, &entry, self.context.user_id.as_deref());
        workitem.replace_item_value(fields::RUNS, workitem.runs() + 1);
        workitem.replace_item_value(fields::LAST_EVENT, event_id);
        debug!(entry = %line, "event processed");

        if let NextElement::ArriveAtTask(task) = &navigation.next {
            arrive(workitem, task);
        }

        for branch in &navigation.split_events {
            self.split(workitem, &version, task_id, branch, transaction)?;
        }

        match &navigation.next {
            NextElement::ContinueAtEvent(next) => {
                workitem.set_event_id(next.id);
            }
            NextElement::ArriveAtTask(_) => advance_event_queue(workitem),
        }

        switch_model(workitem, &event, &version)?;

        if self.context.config.sync_legacy_fields {
            sync_legacy_fields(workitem);
        }
        Ok(())
    }

    /// Derives a new version of `master` and processes the branch event on it.
    fn split(
        &mut self,
        master: &mut Workitem,
        version: &str,
        source_task_id: i64,
        branch: &Event,
        transaction: &mut Transaction,
    ) -> Result<(), KernelError> {
        self.navigator
            .resolve_current(version, source_task_id, branch.id)
            .map_err(|_| ProcessingError::InvalidSplit {
                task_id: source_task_id,
                event_id: branch.id,
            })?;

        let version_id = WorkitemId::new().to_string();
        let mut split = master.clone();
        split.replace_item_value(fields::UNIQUE_ID, version_id.as_str());
        split.replace_item_value(fields::UNIQUE_ID_SOURCE, master.unique_id());
        split.remove_item(fields::UNIQUE_ID_VERSIONS);
        split.remove_item(fields::ACTIVITY_ID_LIST);
        split.set_task_id(source_task_id);
        split.set_event_id(branch.id);
        split.replace_item_value(fields::LAST_TASK, source_task_id);
        split.replace_item_value(fields::IS_VERSION, true);
        master.append_item_value(fields::UNIQUE_ID_VERSIONS, version_id.as_str());

        debug!(
            source = %master.unique_id(),
            version = %version_id,
            event_id = branch.id,
            "processing split version"
        );
        self.run_transitions(&mut split, transaction)?;
        split.remove_item(fields::IS_VERSION);
        self.split_workitems.push(split);
        Ok(())
    }
}

fn validate(workitem: &Workitem) -> Result<(), ProcessingError> {
    if workitem.task_id() <= 0 {
        return Err(ProcessingError::InvalidWorkitem {
            reason: format!("{} must be greater than 0", fields::TASK_ID),
        });
    }
    if workitem.event_id() <= 0 {
        return Err(ProcessingError::InvalidWorkitem {
            reason: format!("{} must be greater than 0", fields::EVENT_ID),
        });
    }
    Ok(())
}

fn arrive(workitem: &mut Workitem, task: &Task) {
    workitem.set_task_id(task.id);
    workitem.replace_item_value(fields::WORKFLOW_STATUS, task.name.as_str());
    workitem.replace_item_value(fields::WORKFLOW_GROUP, task.group.as_str());

    let task_type = task.items.item_value_string(TASK_TYPE_ITEM);
    if !task_type.is_empty() {
        workitem.replace_item_value(fields::TYPE, task_type);
    }
}

/// Clears the fired event and takes the next one from `$activityidlist`.
fn advance_event_queue(workitem: &mut Workitem) {
    workitem.set_event_id(0);
    if !workitem.has_item(fields::ACTIVITY_ID_LIST) {
        return;
    }

    let mut queue: Vec<i64> = workitem
        .item_values(fields::ACTIVITY_ID_LIST)
        .iter()
        .filter_map(queued_event_id)
        .filter(|id| *id > 0)
        .collect();
    if !queue.is_empty() {
        let next = queue.remove(0);
        debug!(event_id = next, remaining = queue.len(), "taking queued event");
        workitem.set_event_id(next);
    }
    workitem.set_item_values(
        fields::ACTIVITY_ID_LIST,
        queue.into_iter().map(Value::from).collect(),
    );
}

fn queued_event_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Moves the workitem to another model version if the event says so.
fn switch_model(workitem: &mut Workitem, event: &Event, version: &str) -> Result<(), ModelError> {
    if !event.items.has_item(MODEL_VERSION_ITEM) {
        return Ok(());
    }

    let target = event.items.item_value_string(MODEL_VERSION_ITEM);
    let target_event = event.items.item_value_integer(MODEL_EVENT_ITEM);
    if target.trim().is_empty() || target_event <= 0 {
        return Err(ModelError::InvalidModel {
            version: version.to_string(),
            reason: format!(
                "event {} requests a model switch without {MODEL_VERSION_ITEM} and {MODEL_EVENT_ITEM}",
                event.id
            ),
        });
    }

    let target_task = event.items.item_value_integer(MODEL_TASK_ITEM);
    info!(from = version, to = %target, event_id = target_event, "switching model version");
    workitem.replace_item_value(fields::MODEL_VERSION, target);
    workitem.set_event_id(target_event);
    if target_task > 0 {
        workitem.set_task_id(target_task);
    }
    Ok(())
}

fn sync_legacy_fields(workitem: &mut Workitem) {
    workitem.replace_item_value(legacy::PROCESS_ID, workitem.task_id());
    workitem.replace_item_value(legacy::ACTIVITY_ID, workitem.event_id());
    workitem.replace_item_value(
        legacy::LAST_ACTIVITY_ID,
        workitem.item_value_integer(fields::LAST_EVENT),
    );
    workitem.replace_item_value(
        legacy::WORKFLOW_STATUS,
        workitem.item_value_string(fields::WORKFLOW_STATUS),
    );
    workitem.replace_item_value(legacy::WORKFLOW_GROUP, workitem.workflow_group());
    let log = workitem.item_values(fields::EVENT_LOG).to_vec();
    workitem.set_item_values(legacy::EVENT_LOG, log);
}
