use crate::error::PluginError;
use crate::plugin::{CloseStatus, KernelContext, Plugin};
use chrono::Utc;
use tracing::debug;
use waymark_core::Workitem;
use waymark_model::Event;

/// Event item holding the history message.
pub const HISTORY_MESSAGE_ITEM: &str = "history.message";

/// Workitem field the history is kept in, oldest first.
pub const HISTORY_FIELD: &str = "txtworkflowhistory";

const PLUGIN_TYPE: &str = "waymark.history";

/// Appends `<timestamp>|<user>|<message>` to the workitem's history for
/// events that carry a message.
#[derive(Debug, Default)]
pub struct HistoryPlugin {
    user_id: String,
    pending: usize,
}

impl HistoryPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries written since the last `close`.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl Plugin for HistoryPlugin {
    fn plugin_type(&self) -> &str {
        PLUGIN_TYPE
    }

    fn depends_on(&self) -> Vec<String> {
        vec!["waymark.rule".to_string()]
    }

    fn init(&mut self, context: &KernelContext) -> Result<(), PluginError> {
        self.user_id = context.user_id.clone().unwrap_or_default();
        Ok(())
    }

    fn run(&mut self, mut workitem: Workitem, event: &Event) -> Result<Option<Workitem>, PluginError> {
        let message = event.items.item_value_string(HISTORY_MESSAGE_ITEM);
        if message.is_empty() {
            return Ok(Some(workitem));
        }
        let entry = format!("{}|{}|{message}", Utc::now().to_rfc3339(), self.user_id);
        workitem.append_item_value(HISTORY_FIELD, entry);
        self.pending += 1;
        Ok(Some(workitem))
    }

    fn close(&mut self, status: CloseStatus) -> Result<(), PluginError> {
        if status == CloseStatus::Error && self.pending > 0 {
            debug!(entries = self.pending, "history entries discarded");
        }
        self.pending = 0;
        Ok(())
    }
}
