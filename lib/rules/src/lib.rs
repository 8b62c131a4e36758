//! Rule evaluation for the waymark workflow kernel.
//!
//! The navigator uses a [`RuleEvaluator`] to pick conditional branches;
//! plugins use it to compute field assignments from result scripts.

pub mod engine;
pub mod error;
mod syntax;

pub use engine::{ExpressionEngine, RuleEvaluator};
pub use error::RuleError;
