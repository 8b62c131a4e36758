//! The plugin contract and the ordered plugin registry.
//!
//! Every processed event runs the registered plugins in registration order.
//! A plugin is initialized the first time the kernel enters it. After each
//! chain every plugin entered by it is closed in reverse order, with
//! [`CloseStatus::Error`] if the chain failed.

use crate::config::KernelConfig;
use crate::error::PluginError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use waymark_core::Workitem;
use waymark_model::{Event, ModelStore};
use waymark_rules::RuleEvaluator;

/// Outcome handed to [`Plugin::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    /// The call committed; keep what was done.
    Success,
    /// The call failed; discard anything pending.
    Error,
}

/// Shared services a kernel hands to its plugins.
#[derive(Clone)]
pub struct KernelContext {
    pub store: Arc<ModelStore>,
    pub rules: Arc<dyn RuleEvaluator>,
    /// Acting user, written to event log entries that carry a comment.
    pub user_id: Option<String>,
    pub config: KernelConfig,
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext")
            .field("store", &self.store)
            .field("user_id", &self.user_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A unit of business logic run for every processed event.
///
/// Implementations receive the workitem by value and return the updated
/// workitem. Returning `Ok(None)` or an error aborts the call.
pub trait Plugin: Send {
    /// Stable identifier used to unregister the plugin.
    fn plugin_type(&self) -> &str;

    /// Plugin types expected to be registered before this one.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once, before the first `run`.
    ///
    /// # Errors
    ///
    /// An error aborts the current call.
    fn init(&mut self, _context: &KernelContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Processes one event.
    ///
    /// # Errors
    ///
    /// An error aborts the current call and closes the chain with
    /// [`CloseStatus::Error`].
    fn run(&mut self, workitem: Workitem, event: &Event) -> Result<Option<Workitem>, PluginError>;

    /// Called after every chain on each plugin the chain entered.
    ///
    /// # Errors
    ///
    /// Errors are logged and otherwise ignored.
    fn close(&mut self, _status: CloseStatus) -> Result<(), PluginError> {
        Ok(())
    }
}

struct PluginEntry {
    plugin: Box<dyn Plugin>,
    initialized: bool,
}

/// Plugins in registration order. The same type may be registered twice.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugin_types()).finish()
    }
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registered plugin types in order.
    #[must_use]
    pub fn plugin_types(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.plugin.plugin_type())
            .collect()
    }

    #[must_use]
    pub fn contains(&self, plugin_type: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.plugin.plugin_type() == plugin_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a plugin.
    ///
    /// Missing dependencies are logged; the plugin is registered anyway.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        for dependency in plugin.depends_on() {
            if !self.contains(&dependency) {
                warn!(
                    plugin = plugin.plugin_type(),
                    dependency = %dependency,
                    "plugin dependency is not registered"
                );
            }
        }
        debug!(plugin = plugin.plugin_type(), "plugin registered");
        self.entries.push(PluginEntry {
            plugin,
            initialized: false,
        });
    }

    /// Removes the first plugin of the given type and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotRegistered`] if no plugin has this type.
    pub fn unregister(&mut self, plugin_type: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.plugin.plugin_type() == plugin_type)
            .ok_or_else(|| PluginError::NotRegistered {
                plugin_type: plugin_type.to_string(),
            })?;
        debug!(plugin = plugin_type, "plugin unregistered");
        Ok(self.entries.remove(position).plugin)
    }

    /// Removes every plugin.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Runs every plugin in order.
    ///
    /// `entered` is raised to the number of plugins entered by the chain,
    /// including a plugin that failed.
    pub(crate) fn run_chain(
        &mut self,
        context: &KernelContext,
        mut workitem: Workitem,
        event: &Event,
        entered: &mut usize,
    ) -> Result<Workitem, PluginError> {
        for (position, entry) in self.entries.iter_mut().enumerate() {
            *entered = (*entered).max(position + 1);
            let plugin_type = entry.plugin.plugin_type().to_string();

            if !entry.initialized {
                entry.plugin.init(context)?;
                entry.initialized = true;
            }

            let started = Instant::now();
            let result = entry.plugin.run(workitem, event);
            debug!(
                plugin = %plugin_type,
                event_id = event.id,
                elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                "plugin finished"
            );

            workitem = result?.ok_or(PluginError::EmptyResult { plugin_type })?;
        }
        Ok(workitem)
    }

    /// Closes the first `entered` plugins in reverse order.
    pub(crate) fn close(&mut self, entered: usize, status: CloseStatus) {
        for entry in self.entries.iter_mut().take(entered).rev() {
            if let Err(err) = entry.plugin.close(status) {
                error!(
                    plugin = entry.plugin.plugin_type(),
                    ?status,
                    error = %err,
                    "failed to close plugin"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use waymark_rules::ExpressionEngine;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        journal: Journal,
        fail: bool,
    }

    impl Plugin for Recording {
        fn plugin_type(&self) -> &str {
            self.name
        }

        fn depends_on(&self) -> Vec<String> {
            vec!["base".to_string()]
        }

        fn init(&mut self, _context: &KernelContext) -> Result<(), PluginError> {
            self.journal.lock().expect("journal").push(format!("init {}", self.name));
            Ok(())
        }

        fn run(&mut self, workitem: Workitem, _event: &Event) -> Result<Option<Workitem>, PluginError> {
            self.journal.lock().expect("journal").push(format!("run {}", self.name));
            if self.fail {
                return Err(PluginError::failed(self.name, "boom"));
            }
            Ok(Some(workitem.with_item(self.name, true)))
        }

        fn close(&mut self, status: CloseStatus) -> Result<(), PluginError> {
            self.journal
                .lock()
                .expect("journal")
                .push(format!("close {} {status:?}", self.name));
            Ok(())
        }
    }

    struct Silent;

    impl Plugin for Silent {
        fn plugin_type(&self) -> &str {
            "silent"
        }

        fn run(&mut self, _workitem: Workitem, _event: &Event) -> Result<Option<Workitem>, PluginError> {
            Ok(None)
        }
    }

    fn context() -> KernelContext {
        KernelContext {
            store: Arc::new(ModelStore::new()),
            rules: Arc::new(ExpressionEngine::new()),
            user_id: None,
            config: KernelConfig::default(),
        }
    }

    fn recording(name: &'static str, journal: &Journal, fail: bool) -> Box<dyn Plugin> {
        Box::new(Recording {
            name,
            journal: Arc::clone(journal),
            fail,
        })
    }

    #[test]
    fn chain_runs_in_order_and_initializes_once() {
        let journal = Journal::default();
        let mut registry = PluginRegistry::new();
        registry.register(recording("a", &journal, false));
        registry.register(recording("b", &journal, false));

        let event = Event::new(10, "Save");
        for _ in 0..2 {
            let mut entered = 0;
            let workitem = registry
                .run_chain(&context(), Workitem::new(), &event, &mut entered)
                .expect("chain should succeed");
            assert!(workitem.item_value_bool("a"));
            assert!(workitem.item_value_bool("b"));
            registry.close(entered, CloseStatus::Success);
        }

        let journal = journal.lock().expect("journal").clone();
        assert_eq!(
            journal,
            vec![
                "init a",
                "run a",
                "init b",
                "run b",
                "close b Success",
                "close a Success",
                "run a",
                "run b",
                "close b Success",
                "close a Success",
            ]
        );
    }

    #[test]
    fn failure_stops_the_chain_and_counts_the_failing_plugin() {
        let journal = Journal::default();
        let mut registry = PluginRegistry::new();
        registry.register(recording("a", &journal, false));
        registry.register(recording("b", &journal, true));
        registry.register(recording("c", &journal, false));

        let mut entered = 0;
        let err = registry
            .run_chain(&context(), Workitem::new(), &Event::new(10, "Save"), &mut entered)
            .expect_err("chain should fail");
        assert!(matches!(err, PluginError::Failed { .. }));
        assert_eq!(entered, 2);

        registry.close(entered, CloseStatus::Error);
        let journal = journal.lock().expect("journal").clone();
        assert!(!journal.contains(&"run c".to_string()));
        assert_eq!(&journal[journal.len() - 2..], ["close b Error", "close a Error"]);
    }

    #[test]
    fn missing_result_is_an_error() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(Silent));
        let mut entered = 0;
        let err = registry
            .run_chain(&context(), Workitem::new(), &Event::new(10, "Save"), &mut entered)
            .expect_err("chain should fail");
        assert_eq!(
            err,
            PluginError::EmptyResult {
                plugin_type: "silent".to_string()
            }
        );
    }

    #[test]
    fn unregister_removes_first_match() {
        let journal = Journal::default();
        let mut registry = PluginRegistry::new();
        registry.register(recording("a", &journal, false));
        registry.register(recording("b", &journal, false));
        registry.register(recording("a", &journal, false));

        registry.unregister("a").expect("plugin should be removed");
        assert_eq!(registry.plugin_types(), vec!["b", "a"]);

        assert!(matches!(
            registry.unregister("missing"),
            Err(PluginError::NotRegistered { .. })
        ));

        registry.clear();
        assert!(registry.is_empty());
    }
}
