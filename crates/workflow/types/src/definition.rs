//! Workflow descriptors: the blueprint executed by the engine
//!
//! A WorkflowDescriptor owns every step, action, split and join of one
//! definition. Children never point back at their parent; the engine
//! resolves ownership through id lookups on the descriptor.
//!
//! Descriptors are immutable once registered. To modify, register a new one.

use crate::{
    ActionDescriptor, ActionScope, ConditionsDescriptor, DescriptorError, DescriptorResult,
    FunctionDescriptor, RegisterDescriptor, ResultDescriptor, ResultTarget, ScopedAction,
    SAME_STEP,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ── Workflow Descriptor ──────────────────────────────────────────────

/// A complete workflow definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    /// Name entries refer to
    pub name: String,
    /// Actions that may start a new entry
    #[serde(default)]
    pub initial_actions: Vec<ActionDescriptor>,
    /// Actions available from any step
    #[serde(default)]
    pub global_actions: Vec<ActionDescriptor>,
    /// Shared actions, referenced from steps by id
    #[serde(default)]
    pub common_actions: BTreeMap<i32, ActionDescriptor>,
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
    #[serde(default)]
    pub splits: Vec<SplitDescriptor>,
    #[serde(default)]
    pub joins: Vec<JoinDescriptor>,
    /// Checked for every non-initial action in addition to its restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_conditions: Option<ConditionsDescriptor>,
    #[serde(default)]
    pub registers: Vec<RegisterDescriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl WorkflowDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_actions: Vec::new(),
            global_actions: Vec::new(),
            common_actions: BTreeMap::new(),
            steps: Vec::new(),
            splits: Vec::new(),
            joins: Vec::new(),
            global_conditions: None,
            registers: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_initial_action(mut self, action: ActionDescriptor) -> Self {
        self.initial_actions.push(action);
        self
    }

    pub fn with_global_action(mut self, action: ActionDescriptor) -> Self {
        self.global_actions.push(action);
        self
    }

    pub fn with_common_action(mut self, action: ActionDescriptor) -> Self {
        self.common_actions.insert(action.id, action);
        self
    }

    pub fn with_step(mut self, step: StepDescriptor) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_split(mut self, split: SplitDescriptor) -> Self {
        self.splits.push(split);
        self
    }

    pub fn with_join(mut self, join: JoinDescriptor) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_global_conditions(mut self, conditions: ConditionsDescriptor) -> Self {
        self.global_conditions = Some(conditions);
        self
    }

    pub fn with_register(mut self, register: RegisterDescriptor) -> Self {
        self.registers.push(register);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get_step(&self, id: i32) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn get_split(&self, id: i32) -> Option<&SplitDescriptor> {
        self.splits.iter().find(|s| s.id == id)
    }

    pub fn get_join(&self, id: i32) -> Option<&JoinDescriptor> {
        self.joins.iter().find(|j| j.id == id)
    }

    pub fn get_initial_action(&self, id: i32) -> Option<&ActionDescriptor> {
        self.initial_actions.iter().find(|a| a.id == id)
    }

    pub fn get_global_action(&self, id: i32) -> Option<&ActionDescriptor> {
        self.global_actions.iter().find(|a| a.id == id)
    }

    pub fn get_common_action(&self, id: i32) -> Option<&ActionDescriptor> {
        self.common_actions.get(&id)
    }

    pub fn is_initial_action(&self, id: i32) -> bool {
        self.get_initial_action(id).is_some()
    }

    /// Global actions with their scope
    pub fn scoped_global_actions(&self) -> impl Iterator<Item = ScopedAction<'_>> {
        self.global_actions
            .iter()
            .map(|a| ScopedAction::new(ActionScope::Global, a))
    }

    /// Actions offered by a step: local ones first, then referenced common ones.
    /// Unknown step ids yield nothing; dangling common references are skipped.
    pub fn actions_for_step(&self, step_id: i32) -> Vec<ScopedAction<'_>> {
        let Some(step) = self.get_step(step_id) else {
            return Vec::new();
        };
        step.actions
            .iter()
            .map(|a| ScopedAction::new(ActionScope::Step(step_id), a))
            .chain(step.common_actions.iter().filter_map(|id| {
                self.get_common_action(*id)
                    .map(|a| ScopedAction::new(ActionScope::Common, a))
            }))
            .collect()
    }

    /// Find an action offered by a step
    pub fn action_for_step(&self, step_id: i32, action_id: i32) -> Option<ScopedAction<'_>> {
        self.actions_for_step(step_id)
            .into_iter()
            .find(|a| a.id() == action_id)
    }

    /// Whether any action of the step can terminate in the join
    pub fn results_in_join(&self, step_id: i32, join_id: i32) -> bool {
        self.actions_for_step(step_id)
            .iter()
            .any(|a| a.action.results().any(|r| r.targets_join(join_id)))
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Validate the descriptor for structural correctness
    pub fn validate(&self) -> DescriptorResult<()> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::MissingName);
        }
        if self.initial_actions.is_empty() {
            return Err(DescriptorError::NoInitialAction(self.name.clone()));
        }

        // Step, split and join ids are unique within their own id-space
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id) {
                return Err(DescriptorError::DuplicateStepId(step.id));
            }
        }
        seen.clear();
        for split in &self.splits {
            if !seen.insert(split.id) {
                return Err(DescriptorError::DuplicateSplitId(split.id));
            }
        }
        seen.clear();
        for join in &self.joins {
            if !seen.insert(join.id) {
                return Err(DescriptorError::DuplicateJoinId(join.id));
            }
        }

        // Action ids are unique across initial, global and step scopes.
        // Common actions may legitimately repeat through references.
        let mut action_ids = HashSet::new();
        let local_actions = self
            .initial_actions
            .iter()
            .chain(self.global_actions.iter())
            .chain(self.steps.iter().flat_map(|s| s.actions.iter()));
        for action in local_actions {
            if !action_ids.insert(action.id) {
                return Err(DescriptorError::DuplicateActionId(action.id));
            }
        }

        for step in &self.steps {
            for common in &step.common_actions {
                if !self.common_actions.contains_key(common) {
                    return Err(DescriptorError::CommonActionNotFound(*common));
                }
            }
        }

        let all_actions = self
            .initial_actions
            .iter()
            .chain(self.global_actions.iter())
            .chain(self.common_actions.values())
            .chain(self.steps.iter().flat_map(|s| s.actions.iter()));
        for action in all_actions {
            if action.unconditional_result.is_none() {
                return Err(DescriptorError::MissingUnconditionalResult(action.id));
            }
            for result in action.results() {
                self.check_target(result)?;
            }
        }

        for split in &self.splits {
            if split.results.is_empty() {
                return Err(DescriptorError::EmptySplit(split.id));
            }
            for result in &split.results {
                match result.target {
                    ResultTarget::Step(_) => self.check_target(result)?,
                    other => {
                        return Err(DescriptorError::SplitResultNotStep {
                            split: split.id,
                            target: other.to_string(),
                        })
                    }
                }
            }
        }

        for join in &self.joins {
            let result = join
                .result
                .as_ref()
                .ok_or(DescriptorError::MissingJoinResult(join.id))?;
            self.check_target(result)?;
        }

        Ok(())
    }

    fn check_target(&self, result: &ResultDescriptor) -> DescriptorResult<()> {
        match result.target {
            ResultTarget::Step(SAME_STEP) => Ok(()),
            ResultTarget::Step(id) if self.get_step(id).is_none() => {
                Err(DescriptorError::StepNotFound(id))
            }
            ResultTarget::Split(id) if self.get_split(id).is_none() => {
                Err(DescriptorError::SplitNotFound(id))
            }
            ResultTarget::Join(id) if self.get_join(id).is_none() => {
                Err(DescriptorError::JoinNotFound(id))
            }
            _ => Ok(()),
        }
    }

    /// Total number of step definitions
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

// ── Step Descriptor ──────────────────────────────────────────────────

/// A position an entry can occupy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    /// Actions declared on this step
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    /// Ids of common actions offered by this step
    #[serde(default)]
    pub common_actions: Vec<i32>,
    /// Run when a new step of this definition is created
    #[serde(default)]
    pub pre_functions: Vec<FunctionDescriptor>,
    /// Run when a step of this definition is left
    #[serde(default)]
    pub post_functions: Vec<FunctionDescriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl StepDescriptor {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            actions: Vec::new(),
            common_actions: Vec::new(),
            pre_functions: Vec::new(),
            post_functions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_common_action(mut self, action_id: i32) -> Self {
        self.common_actions.push(action_id);
        self
    }

    pub fn with_pre_function(mut self, function: FunctionDescriptor) -> Self {
        self.pre_functions.push(function);
        self
    }

    pub fn with_post_function(mut self, function: FunctionDescriptor) -> Self {
        self.post_functions.push(function);
        self
    }

    /// A step with no actions ends the entry implicitly
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty() || !self.common_actions.is_empty()
    }
}

// ── Split and Join ───────────────────────────────────────────────────

/// Fan-out: every result fires together
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitDescriptor {
    pub id: i32,
    #[serde(default)]
    pub results: Vec<ResultDescriptor>,
}

impl SplitDescriptor {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            results: Vec::new(),
        }
    }

    pub fn with_result(mut self, result: ResultDescriptor) -> Self {
        self.results.push(result);
        self
    }
}

/// Barrier: fires its result once the condition over the branches passes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub id: i32,
    #[serde(default)]
    pub conditions: ConditionsDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultDescriptor>,
}

impl JoinDescriptor {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            conditions: ConditionsDescriptor::default(),
            result: None,
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionsDescriptor) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_result(mut self, result: ResultDescriptor) -> Self {
        self.result = Some(result);
        self
    }
}
