//! Error types for the kernel crate.
//!
//! - `PluginError`: Failures raised by or about plugins
//! - `ProcessingError`: Workitem state the kernel refuses to advance
//! - `KernelError`: Everything `process` and `eval` can fail with

use std::fmt;
use waymark_model::ModelError;

/// Errors from the plugin chain and registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A plugin failed while initializing, running or closing.
    Failed { plugin_type: String, reason: String },
    /// A plugin returned no workitem.
    EmptyResult { plugin_type: String },
    /// No plugin of this type is registered.
    NotRegistered { plugin_type: String },
    /// A script configured for a plugin could not be evaluated.
    InvalidScript { plugin_type: String, reason: String },
}

impl PluginError {
    /// Convenience constructor for [`PluginError::Failed`].
    pub fn failed(plugin_type: &str, reason: impl Into<String>) -> Self {
        Self::Failed {
            plugin_type: plugin_type.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed {
                plugin_type,
                reason,
            } => write!(f, "plugin '{plugin_type}' failed: {reason}"),
            Self::EmptyResult { plugin_type } => {
                write!(f, "plugin '{plugin_type}' returned no workitem")
            }
            Self::NotRegistered { plugin_type } => {
                write!(f, "plugin '{plugin_type}' is not registered")
            }
            Self::InvalidScript {
                plugin_type,
                reason,
            } => write!(f, "plugin '{plugin_type}' has an invalid script: {reason}"),
        }
    }
}

impl std::error::Error for PluginError {}

/// Errors about the workitem being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The workitem does not address a task and event.
    InvalidWorkitem { reason: String },
    /// The same `task.event` edge was reached twice in one call.
    LoopDetected { edge: String, history: Vec<String> },
    /// More events were chained in one call than allowed.
    HopLimitExceeded { limit: usize },
    /// A split branch event is not defined on the source task.
    InvalidSplit { task_id: i64, event_id: i64 },
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWorkitem { reason } => write!(f, "invalid workitem: {reason}"),
            Self::LoopDetected { edge, history } => {
                write!(
                    f,
                    "loop detected: event {edge} reached again after [{}]",
                    history.join(", ")
                )
            }
            Self::HopLimitExceeded { limit } => {
                write!(f, "loop detected: more than {limit} events chained in one call")
            }
            Self::InvalidSplit { task_id, event_id } => {
                write!(f, "split event {task_id}.{event_id} is not defined")
            }
        }
    }
}

impl std::error::Error for ProcessingError {}

/// Errors returned by the workflow kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Model lookup or navigation failed.
    Model(ModelError),
    /// A plugin failed.
    Plugin(PluginError),
    /// The workitem could not be advanced.
    Processing(ProcessingError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(e) => write!(f, "model error: {e}"),
            Self::Plugin(e) => write!(f, "plugin error: {e}"),
            Self::Processing(e) => write!(f, "processing error: {e}"),
        }
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Model(e) => Some(e),
            Self::Plugin(e) => Some(e),
            Self::Processing(e) => Some(e),
        }
    }
}

impl From<ModelError> for KernelError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

impl From<PluginError> for KernelError {
    fn from(e: PluginError) -> Self {
        Self::Plugin(e)
    }
}

impl From<ProcessingError> for KernelError {
    fn from(e: ProcessingError) -> Self {
        Self::Processing(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_errors_mention_loop_detection() {
        let repeated = ProcessingError::LoopDetected {
            edge: "100.10".to_string(),
            history: vec!["100.10".to_string(), "100.20".to_string()],
        };
        assert!(repeated.to_string().contains("loop detected"));
        assert!(repeated.to_string().contains("100.10, 100.20"));

        let exhausted = ProcessingError::HopLimitExceeded { limit: 256 };
        assert!(exhausted.to_string().contains("loop detected"));
    }

    #[test]
    fn kernel_error_wraps_sources() {
        let err = KernelError::from(PluginError::NotRegistered {
            plugin_type: "audit".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "plugin error: plugin 'audit' is not registered"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
