//! Core domain types and utilities for the waymark workflow kernel.
//!
//! This crate provides the workitem record, the well-known field names the
//! kernel reads and writes, generated identifiers, and the shared `Result`
//! alias used at service boundaries.

pub mod error;
pub mod fields;
pub mod id;
pub mod item;

pub use error::Result;
pub use id::{ParseIdError, TransactionId, WorkitemId};
pub use item::Workitem;
