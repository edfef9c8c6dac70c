//! Workflow storage abstractions.
//!
//! This crate defines the persistence contract the workflow engine
//! consumes:
//! - entries and their lifecycle state
//! - current and history step partitions, with the move between them
//! - per-entry property sets
//! - search by step and entry fields
//!
//! The engine provides no concurrency control of its own. A backend that
//! serves concurrent callers on one entry is responsible for serializing them.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod property;
mod query;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryWorkflowStore;
pub use property::PropertySet;
pub use query::{FieldCondition, QueryContext, StepQuery};
pub use traits::{NewStep, WorkflowStore};
