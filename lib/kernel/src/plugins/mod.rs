//! Plugins shipped with the kernel.

mod history;
mod rule;

pub use history::{HISTORY_FIELD, HISTORY_MESSAGE_ITEM, HistoryPlugin};
pub use rule::{RULE_DEFINITION_ITEM, RulePlugin};
