//! Declarative workflow engine
//!
//! Executes workflow descriptors against persisted entries. A descriptor
//! declares steps, actions, splits and joins; the engine decides which
//! actions are available, runs the chosen one through its hooks, and
//! moves the entry's steps between the current and history partitions
//! of a [`workflow_store::WorkflowStore`].
//!
//! # Architecture
//!
//! The [`WorkflowOrchestrator`] composes specialized components:
//!
//! - [`DescriptorRegistry`]: Stores validated workflow descriptors by name
//! - [`StateMachine`]: Executes one action, including split and join dispatch
//! - [`ConditionEvaluator`]: Evaluates AND/OR guard trees
//! - [`EntryLifecycle`]: The only place entry states change
//! - [`ExtensionRegistry`]: Resolves guards, validators, functions and registers by type name
//! - [`VariableResolver`]: Interpolates `${...}` references in descriptor arguments
//!
//! Everything is synchronous. One public call runs on the caller's thread,
//! including any auto-executed follow-up actions.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use workflow_engine::{Inputs, WorkflowOrchestrator};
//! use workflow_store::InMemoryWorkflowStore;
//! use workflow_types::*;
//!
//! let mut orchestrator = WorkflowOrchestrator::new(Arc::new(InMemoryWorkflowStore::new()));
//!
//! let descriptor = WorkflowDescriptor::new("review")
//!     .with_initial_action(
//!         ActionDescriptor::new(1, "Start").with_result(ResultDescriptor::to_step(1)),
//!     )
//!     .with_step(
//!         StepDescriptor::new(1, "Review").with_action(
//!             ActionDescriptor::new(10, "Approve")
//!                 .with_result(ResultDescriptor::to_step(2))
//!                 .finishing(),
//!         ),
//!     )
//!     .with_step(StepDescriptor::new(2, "Approved"));
//! orchestrator.register_descriptor(descriptor).unwrap();
//!
//! let entry = orchestrator.initialize("review", 1, Inputs::new()).unwrap();
//! assert_eq!(orchestrator.get_available_actions(entry, Inputs::new()).unwrap(), vec![10]);
//!
//! orchestrator.do_action(entry, 10, Inputs::new()).unwrap();
//! assert_eq!(orchestrator.get_entry_state(entry), EntryState::Completed);
//! ```

#![deny(unsafe_code)]

pub mod availability;
pub mod builtins;
pub mod condition_evaluator;
pub mod config;
pub mod context;
pub mod definition_registry;
pub mod error;
pub mod extension;
pub mod lifecycle;
pub mod orchestrator;
pub mod resolver;
pub mod scope;
pub mod state_machine;

// Re-export main types
pub use availability::AvailabilityCache;
pub use condition_evaluator::ConditionEvaluator;
pub use config::EngineConfig;
pub use context::{BasicWorkflowContext, WorkflowContext};
pub use definition_registry::DescriptorRegistry;
pub use error::{WorkflowError, WorkflowResult};
pub use extension::{Condition, ExtensionKind, ExtensionRegistry, FunctionProvider, Register, Validator};
pub use lifecycle::EntryLifecycle;
pub use orchestrator::WorkflowOrchestrator;
pub use resolver::{DefaultVariableResolver, VariableResolver};
pub use scope::{Inputs, JoinNodes, TransientScope};
pub use state_machine::{StateMachine, TransitionOutcome};
