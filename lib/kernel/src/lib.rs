//! The waymark workflow kernel.
//!
//! [`WorkflowKernel::process`] advances a workitem through a process model:
//! it resolves the event the workitem addresses, runs the registered
//! [`Plugin`]s, writes the event log and run bookkeeping, and follows
//! chained and queued events until the workitem comes to rest at a task.
//!
//! Models live in a shared [`waymark_model::ModelStore`]; conditions and
//! result scripts are evaluated by a [`waymark_rules::RuleEvaluator`].

pub mod config;
pub mod error;
pub mod event_log;
pub mod kernel;
pub mod plugin;
pub mod plugins;

pub use config::KernelConfig;
pub use error::{KernelError, PluginError, ProcessingError};
pub use event_log::EVENT_LOG_CAPACITY;
pub use kernel::{MAX_EVENT_HOPS, WorkflowKernel};
pub use plugin::{CloseStatus, KernelContext, Plugin, PluginRegistry};
pub use plugins::{HistoryPlugin, RulePlugin};
