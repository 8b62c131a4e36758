use crate::error::PluginError;
use crate::plugin::{CloseStatus, KernelContext, Plugin};
use std::sync::Arc;
use tracing::debug;
use waymark_core::Workitem;
use waymark_model::Event;
use waymark_rules::RuleEvaluator;

/// Event item holding the result script.
pub const RULE_DEFINITION_ITEM: &str = "rule.definition";

const PLUGIN_TYPE: &str = "waymark.rule";

/// Applies the fields assigned by an event's result script.
///
/// An event without a script passes the workitem through unchanged.
#[derive(Default)]
pub struct RulePlugin {
    rules: Option<Arc<dyn RuleEvaluator>>,
    pending: Vec<String>,
}

impl RulePlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields assigned since the last `close`.
    #[must_use]
    pub fn pending(&self) -> &[String] {
        &self.pending
    }
}

impl Plugin for RulePlugin {
    fn plugin_type(&self) -> &str {
        PLUGIN_TYPE
    }

    fn init(&mut self, context: &KernelContext) -> Result<(), PluginError> {
        self.rules = Some(Arc::clone(&context.rules));
        Ok(())
    }

    fn run(&mut self, mut workitem: Workitem, event: &Event) -> Result<Option<Workitem>, PluginError> {
        let script = event.items.item_value_string(RULE_DEFINITION_ITEM);
        if script.trim().is_empty() {
            return Ok(Some(workitem));
        }
        let rules = self
            .rules
            .as_ref()
            .ok_or_else(|| PluginError::failed(PLUGIN_TYPE, "plugin is not initialized"))?;

        let result = rules
            .evaluate_result(&script, &workitem)
            .map_err(|err| PluginError::InvalidScript {
                plugin_type: PLUGIN_TYPE.to_string(),
                reason: err.to_string(),
            })?;

        if let Some(result) = result {
            for name in result.item_names() {
                workitem.set_item_values(name, result.item_values(name).to_vec());
                self.pending.push(name.to_string());
            }
            debug!(event_id = event.id, fields = ?self.pending, "rule result applied");
        }
        Ok(Some(workitem))
    }

    fn close(&mut self, status: CloseStatus) -> Result<(), PluginError> {
        if status == CloseStatus::Error && !self.pending.is_empty() {
            debug!(fields = ?self.pending, "rule result discarded");
        }
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use waymark_model::ModelStore;
    use waymark_rules::ExpressionEngine;

    fn initialized() -> RulePlugin {
        let mut plugin = RulePlugin::new();
        let context = KernelContext {
            store: Arc::new(ModelStore::new()),
            rules: Arc::new(ExpressionEngine::new()),
            user_id: None,
            config: KernelConfig::default(),
        };
        plugin.init(&context).expect("init should succeed");
        plugin
    }

    #[test]
    fn applies_result_fields() {
        let mut plugin = initialized();
        let event = Event::new(10, "Approve")
            .with_item(RULE_DEFINITION_ITEM, "result.approved = _budget > 100; result.level = 2");
        let workitem = Workitem::new().with_item("_budget", 500);

        let result = plugin
            .run(workitem, &event)
            .expect("run should succeed")
            .expect("workitem");
        assert!(result.item_value_bool("approved"));
        assert_eq!(result.item_value_integer("level"), 2);
        assert_eq!(plugin.pending(), ["approved", "level"]);

        plugin.close(CloseStatus::Error).expect("close should succeed");
        assert!(plugin.pending().is_empty());
    }

    #[test]
    fn events_without_script_pass_through() {
        let mut plugin = initialized();
        let workitem = Workitem::new().with_item("_budget", 1);
        let result = plugin
            .run(workitem.clone(), &Event::new(10, "Save"))
            .expect("run should succeed");
        assert_eq!(result, Some(workitem));
    }

    #[test]
    fn broken_script_is_reported() {
        let mut plugin = initialized();
        let event = Event::new(10, "Approve").with_item(RULE_DEFINITION_ITEM, "result.x = (1");
        let err = plugin
            .run(Workitem::new(), &event)
            .expect_err("should fail");
        assert!(matches!(err, PluginError::InvalidScript { .. }));
    }

    #[test]
    fn uninitialized_plugin_fails() {
        let mut plugin = RulePlugin::new();
        let event = Event::new(10, "Approve").with_item(RULE_DEFINITION_ITEM, "result.x = 1");
        assert!(plugin.run(Workitem::new(), &event).is_err());
    }
}
