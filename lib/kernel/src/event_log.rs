//! Bookkeeping written to a workitem after each processed event.
//!
//! Log entries have the form
//! `<timestamp>|<modelVersion>|<taskId>.<eventId>|<nextTaskId>[|<userId>|<comment>]`
//! with millisecond timestamps. The log keeps the newest entries only.

use chrono::{Local, Utc};
use serde_json::Value;
use waymark_core::fields::{self, legacy};
use waymark_core::Workitem;

/// Maximum number of entries kept in `$eventlog`.
pub const EVENT_LOG_CAPACITY: usize = 30;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A processed transition, ready to be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry<'a> {
    pub timestamp: String,
    pub model_version: &'a str,
    pub task_id: i64,
    pub event_id: i64,
    pub next_task_id: i64,
}

impl<'a> LogEntry<'a> {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn now(utc: bool, model_version: &'a str, task_id: i64, event_id: i64, next_task_id: i64) -> Self {
        let timestamp = if utc {
            Utc::now().format(TIMESTAMP_FORMAT).to_string()
        } else {
            Local::now().format(TIMESTAMP_FORMAT).to_string()
        };
        Self {
            timestamp,
            model_version,
            task_id,
            event_id,
            next_task_id,
        }
    }

    fn render(&self, user_id: Option<&str>, comment: &str) -> String {
        let mut line = format!(
            "{}|{}|{}.{}|{}",
            self.timestamp, self.model_version, self.task_id, self.event_id, self.next_task_id
        );
        if !comment.is_empty() {
            line.push('|');
            line.push_str(user_id.unwrap_or_default());
            line.push('|');
            line.push_str(comment);
        }
        line
    }
}

/// Appends an entry to the event log and consumes the pending comment.
///
/// Returns the rendered line.
pub fn append(workitem: &mut Workitem, entry: &LogEntry<'_>, user_id: Option<&str>) -> String {
    let comment = take_comment(workitem);
    let line = entry.render(user_id, &comment);

    let mut log: Vec<Value> = workitem
        .event_log()
        .into_iter()
        .map(Value::String)
        .collect();
    log.push(Value::String(line.clone()));
    if log.len() > EVENT_LOG_CAPACITY {
        log.drain(..log.len() - EVENT_LOG_CAPACITY);
    }
    workitem.set_item_values(fields::EVENT_LOG, log);

    line
}

fn take_comment(workitem: &mut Workitem) -> String {
    let mut comment = workitem.item_value_string(fields::EVENT_LOG_COMMENT);
    if comment.is_empty() {
        comment = workitem.item_value_string(legacy::EVENT_LOG_COMMENT);
    }
    workitem.remove_item(fields::EVENT_LOG_COMMENT);
    workitem.remove_item(legacy::EVENT_LOG_COMMENT);
    comment
}
