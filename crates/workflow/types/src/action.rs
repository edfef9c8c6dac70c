//! Actions and their results
//!
//! An action is a transition. When it fires, the engine picks exactly
//! one result: the first conditional result whose conditions pass, or
//! the unconditional fallback. The result then moves the entry to a
//! step, fans out through a split, or synchronizes through a join.

use crate::{ConditionsDescriptor, FunctionDescriptor, ValidatorDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Step target meaning "stay in the leaving step's definition"
pub const SAME_STEP: i32 = -1;

// ── Result Target ────────────────────────────────────────────────────

/// Where a result sends the entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultTarget {
    /// A step definition id, or [`SAME_STEP`]
    Step(i32),
    Split(i32),
    Join(i32),
}

impl std::fmt::Display for ResultTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step(id) => write!(f, "step {}", id),
            Self::Split(id) => write!(f, "split {}", id),
            Self::Join(id) => write!(f, "join {}", id),
        }
    }
}

// ── Result Descriptor ────────────────────────────────────────────────

/// The declared outcome of an action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub target: ResultTarget,
    /// Status of the step created by this result
    #[serde(default)]
    pub status: String,
    /// Status written to the step being left
    #[serde(default)]
    pub old_status: String,
    /// Owner template for the new step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Due date: an RFC 3339 literal, a millisecond offset, or a `${...}` reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub pre_functions: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub post_functions: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub validators: Vec<ValidatorDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ResultDescriptor {
    pub fn new(target: ResultTarget) -> Self {
        Self {
            target,
            status: String::new(),
            old_status: String::new(),
            owner: None,
            due_date: None,
            pre_functions: Vec::new(),
            post_functions: Vec::new(),
            validators: Vec::new(),
            display_name: None,
        }
    }

    /// Result moving to a step definition
    pub fn to_step(step_id: i32) -> Self {
        Self::new(ResultTarget::Step(step_id))
    }

    /// Result fanning out through a split
    pub fn to_split(split_id: i32) -> Self {
        Self::new(ResultTarget::Split(split_id))
    }

    /// Result synchronizing through a join
    pub fn to_join(join_id: i32) -> Self {
        Self::new(ResultTarget::Join(join_id))
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_old_status(mut self, old_status: impl Into<String>) -> Self {
        self.old_status = old_status.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
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

    pub fn with_validator(mut self, validator: ValidatorDescriptor) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn targets_join(&self, join_id: i32) -> bool {
        self.target == ResultTarget::Join(join_id)
    }
}

/// A result guarded by a condition tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalResult {
    pub conditions: ConditionsDescriptor,
    pub result: ResultDescriptor,
}

impl ConditionalResult {
    pub fn new(conditions: ConditionsDescriptor, result: ResultDescriptor) -> Self {
        Self { conditions, result }
    }
}

// ── Action Descriptor ────────────────────────────────────────────────

/// A transition available from one or more steps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    /// Fire automatically once available after a transition
    #[serde(default)]
    pub auto_execute: bool,
    /// Completes the entry after the transition
    #[serde(default)]
    pub finish: bool,
    /// Availability restriction, checked together with the global conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restriction: Option<ConditionsDescriptor>,
    #[serde(default)]
    pub validators: Vec<ValidatorDescriptor>,
    #[serde(default)]
    pub pre_functions: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub post_functions: Vec<FunctionDescriptor>,
    /// Tried in declared order, first match wins
    #[serde(default)]
    pub conditional_results: Vec<ConditionalResult>,
    /// Required fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unconditional_result: Option<ResultDescriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ActionDescriptor {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            auto_execute: false,
            finish: false,
            restriction: None,
            validators: Vec::new(),
            pre_functions: Vec::new(),
            post_functions: Vec::new(),
            conditional_results: Vec::new(),
            unconditional_result: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_result(mut self, result: ResultDescriptor) -> Self {
        self.unconditional_result = Some(result);
        self
    }

    pub fn with_conditional_result(
        mut self,
        conditions: ConditionsDescriptor,
        result: ResultDescriptor,
    ) -> Self {
        self.conditional_results
            .push(ConditionalResult::new(conditions, result));
        self
    }

    pub fn with_restriction(mut self, restriction: ConditionsDescriptor) -> Self {
        self.restriction = Some(restriction);
        self
    }

    pub fn with_validator(mut self, validator: ValidatorDescriptor) -> Self {
        self.validators.push(validator);
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

    pub fn auto(mut self) -> Self {
        self.auto_execute = true;
        self
    }

    pub fn finishing(mut self) -> Self {
        self.finish = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Every result this action can select, conditional ones first
    pub fn results(&self) -> impl Iterator<Item = &ResultDescriptor> {
        self.conditional_results
            .iter()
            .map(|c| &c.result)
            .chain(self.unconditional_result.iter())
    }
}

// ── Action Ownership ─────────────────────────────────────────────────

/// Where an action is declared inside its workflow descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionScope {
    Initial,
    Global,
    /// Shared action, referenced from steps by id
    Common,
    /// Declared locally on the step definition with this id
    Step(i32),
}

/// Identity of an action inside one descriptor.
///
/// Common actions share one identity no matter which step references them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub scope: ActionScope,
    pub action_id: i32,
}

/// An action together with its declaring scope
#[derive(Clone, Copy, Debug)]
pub struct ScopedAction<'a> {
    pub scope: ActionScope,
    pub action: &'a ActionDescriptor,
}

impl<'a> ScopedAction<'a> {
    pub fn new(scope: ActionScope, action: &'a ActionDescriptor) -> Self {
        Self { scope, action }
    }

    pub fn key(&self) -> ActionKey {
        ActionKey {
            scope: self.scope,
            action_id: self.action.id,
        }
    }

    pub fn id(&self) -> i32 {
        self.action.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConditionDescriptor;

    #[test]
    fn test_action_builder() {
        let action = ActionDescriptor::new(10, "Approve")
            .with_conditional_result(
                ConditionsDescriptor::single(ConditionDescriptor::new("never")),
                ResultDescriptor::to_step(3),
            )
            .with_result(ResultDescriptor::to_step(2).with_old_status("Finished"))
            .auto();

        assert!(action.auto_execute);
        assert!(!action.finish);
        let targets: Vec<_> = action.results().map(|r| r.target).collect();
        assert_eq!(
            targets,
            vec![ResultTarget::Step(3), ResultTarget::Step(2)]
        );
    }

    #[test]
    fn test_common_action_key_is_step_independent() {
        let action = ActionDescriptor::new(5, "Comment");
        let a = ScopedAction::new(ActionScope::Common, &action);
        let b = ScopedAction::new(ActionScope::Common, &action);
        let local = ScopedAction::new(ActionScope::Step(1), &action);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), local.key());
    }

    #[test]
    fn test_result_targets_join() {
        let result = ResultDescriptor::to_join(7);
        assert!(result.targets_join(7));
        assert!(!result.targets_join(8));
        assert_eq!(result.target.to_string(), "join 7");
    }
}
