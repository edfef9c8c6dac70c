//! Transient scope: the per-call variable space
//!
//! A scope is built at the start of every public call and discarded at
//! its end. Guards, validators and functions all see the same scope, so
//! a pre-function can leave a value for a later guard or result template.

use crate::WorkflowContext;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use workflow_store::WorkflowStore;
use workflow_types::{Step, StepId, WorkflowDescriptor, WorkflowEntry};

/// Caller-supplied inputs for a call
pub type Inputs = BTreeMap<String, Value>;

/// Branch steps gathered while evaluating a join
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoinNodes {
    branches: Vec<Step>,
}

impl JoinNodes {
    pub fn new(branches: Vec<Step>) -> Self {
        Self { branches }
    }

    /// The branch step for a step definition, or `None` if that branch
    /// has not arrived
    pub fn step(&self, step_def_id: i32) -> Option<&Step> {
        self.branches.iter().find(|s| s.step_def_id == step_def_id)
    }

    pub fn steps(&self) -> &[Step] {
        &self.branches
    }

    pub fn ids(&self) -> Vec<StepId> {
        self.branches.iter().map(|s| s.id).collect()
    }
}

/// Mutable, non-persisted state shared by every extension during one call
pub struct TransientScope {
    pub context: Arc<dyn WorkflowContext>,
    pub entry: WorkflowEntry,
    pub descriptor: Arc<WorkflowDescriptor>,
    pub store: Arc<dyn WorkflowStore>,
    /// Snapshot taken when the call started
    pub current_steps: Vec<Step>,
    /// Action being checked or executed
    pub action_id: Option<i32>,
    /// Most recent step created during this call
    pub created_step: Option<Step>,
    /// Present only while a join condition is evaluated
    pub join_nodes: Option<JoinNodes>,
    /// Inputs, registers and values left by functions
    pub variables: BTreeMap<String, Value>,
}

impl TransientScope {
    pub fn new(
        context: Arc<dyn WorkflowContext>,
        entry: WorkflowEntry,
        descriptor: Arc<WorkflowDescriptor>,
        store: Arc<dyn WorkflowStore>,
        current_steps: Vec<Step>,
    ) -> Self {
        Self {
            context,
            entry,
            descriptor,
            store,
            current_steps,
            action_id: None,
            created_step: None,
            join_nodes: None,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Inputs) -> Self {
        self.variables.extend(inputs);
        self
    }

    pub fn caller(&self) -> Option<&str> {
        self.context.caller()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Resolve a top-level name. Typed fields win over variables of the
    /// same name.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "entry" => serde_json::to_value(&self.entry).ok(),
            "entryId" => Some(Value::from(self.entry.id.0)),
            "workflowName" => Some(Value::from(self.entry.workflow_name.clone())),
            "actionId" => self.action_id.map(Value::from),
            "caller" => self.caller().map(Value::from),
            "currentSteps" => serde_json::to_value(&self.current_steps).ok(),
            "createdStep" => self
                .created_step
                .as_ref()
                .and_then(|s| serde_json::to_value(s).ok()),
            _ => self.variables.get(name).cloned(),
        }
    }
}

impl std::fmt::Debug for TransientScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientScope")
            .field("caller", &self.caller())
            .field("entry", &self.entry)
            .field("workflow", &self.descriptor.name)
            .field("current_steps", &self.current_steps)
            .field("action_id", &self.action_id)
            .field("created_step", &self.created_step)
            .field("join_nodes", &self.join_nodes)
            .field("variables", &self.variables)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::BasicWorkflowContext;
    use chrono::Utc;
    use workflow_store::InMemoryWorkflowStore;
    use workflow_types::EntryId;

    pub fn make_step(id: u64, step_def_id: i32, owner: Option<&str>, status: &str) -> Step {
        Step {
            id: StepId(id),
            entry_id: EntryId(1),
            step_def_id,
            action_id: 0,
            owner: owner.map(str::to_string),
            caller: None,
            status: status.to_string(),
            start_date: Utc::now(),
            due_date: None,
            finish_date: None,
            previous_step_ids: Vec::new(),
        }
    }

    pub fn make_scope(caller: Option<&str>, current_steps: Vec<Step>) -> TransientScope {
        let context: Arc<dyn WorkflowContext> = match caller {
            Some(c) => Arc::new(BasicWorkflowContext::new(c)),
            None => Arc::new(BasicWorkflowContext::anonymous()),
        };
        TransientScope::new(
            context,
            WorkflowEntry::new(EntryId(1), "test"),
            Arc::new(WorkflowDescriptor::new("test")),
            Arc::new(InMemoryWorkflowStore::new()),
            current_steps,
        )
    }
}
