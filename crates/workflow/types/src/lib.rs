//! Workflow Domain Types
//!
//! Workflows are declarative business-process definitions executed
//! against persisted process instances.
//!
//! # Key Concepts
//!
//! - **WorkflowDescriptor**: The immutable definition. Steps, actions
//!   (global, initial, common), splits, joins, registers and an optional
//!   global condition tree.
//! - **ActionDescriptor**: A transition available from one or more steps.
//!   Conditional results are tried in order, the unconditional result is
//!   the fallback.
//! - **ResultDescriptor**: The outcome of an action, targeting exactly one
//!   of a step, a split or a join.
//! - **ConditionsDescriptor**: AND/OR tree over pluggable leaf guards.
//! - **WorkflowEntry**: One running instance of a definition.
//! - **Step**: An occupied (current) or historical position of an entry.
//!
//! # Design Principles
//!
//! 1. Descriptors are plain data. Ownership is a tree; lookups go through
//!    the owning [`WorkflowDescriptor`] by id, never through back-pointers.
//! 2. Runtime state changes only through the engine and the store.
//! 3. Entry lifecycle edges are encoded once, in [`EntryState`].

#![deny(unsafe_code)]

mod action;
mod condition;
mod definition;
mod errors;
mod instance;

pub use action::*;
pub use condition::*;
pub use definition::*;
pub use errors::*;
pub use instance::*;
