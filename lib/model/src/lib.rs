//! Process models for the waymark workflow kernel.
//!
//! This crate provides:
//! - The element and flow types a process model graph is built from
//! - [`ModelBuilder`] for assembling and validating model versions
//! - [`ModelStore`], the shared registry of model versions with cached lookups
//! - [`ModelNavigator`], which resolves where firing an event leads

pub mod definition;
pub mod element;
pub mod error;
pub mod flow;
pub mod graph;
pub mod navigator;
pub mod store;

pub use definition::{Model, ModelBuilder, ModelDefinition};
pub use element::{Element, ElementId, ElementKind, Event, GatewayKind, Task};
pub use error::{GraphError, ModelError};
pub use flow::SequenceFlow;
pub use graph::ModelGraph;
pub use navigator::{BoundaryTimer, ModelNavigator, NavigationResult, NextElement};
pub use store::{LocatedEvent, ModelStore};
