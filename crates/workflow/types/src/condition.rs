//! Condition trees and extension descriptors
//!
//! Guards, validators, functions and registers are all referenced by a
//! type name plus string arguments. The engine resolves the type name
//! against its extension registry at execution time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String arguments passed to an extension. Values may contain `${...}`
/// references that are interpolated before invocation.
pub type Args = BTreeMap<String, String>;

// ── Condition Tree ───────────────────────────────────────────────────

/// How the children of a condition tree are combined
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Combinator {
    /// Every child must pass; stops at the first failure
    #[default]
    And,
    /// At least one child must pass; stops at the first success
    Or,
}

/// A boolean expression over leaf guards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ConditionsDescriptor {
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

impl ConditionsDescriptor {
    pub fn and() -> Self {
        Self {
            combinator: Combinator::And,
            conditions: Vec::new(),
        }
    }

    pub fn or() -> Self {
        Self {
            combinator: Combinator::Or,
            conditions: Vec::new(),
        }
    }

    /// A single-leaf tree
    pub fn single(condition: ConditionDescriptor) -> Self {
        Self::and().with_condition(condition)
    }

    pub fn with_condition(mut self, condition: ConditionDescriptor) -> Self {
        self.conditions.push(ConditionNode::Leaf(condition));
        self
    }

    pub fn with_nested(mut self, nested: ConditionsDescriptor) -> Self {
        self.conditions.push(ConditionNode::Nested(nested));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A child of a condition tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConditionNode {
    Leaf(ConditionDescriptor),
    Nested(ConditionsDescriptor),
}

/// A leaf guard reference
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionDescriptor {
    /// Registered guard type
    pub type_name: String,
    #[serde(default)]
    pub args: Args,
    /// Invert the guard's answer
    #[serde(default)]
    pub negate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConditionDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            args: Args::new(),
            negate: false,
            name: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ── Functions, Validators, Registers ─────────────────────────────────

/// A side-effecting hook run before or after a transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub type_name: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FunctionDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            args: Args::new(),
            name: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// An input check run before any mutation of the selected path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDescriptor {
    pub type_name: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ValidatorDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            args: Args::new(),
            name: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// Places a computed value into every transient scope of the workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    /// Name under which the value appears in the scope
    pub variable_name: String,
    pub type_name: String,
    #[serde(default)]
    pub args: Args,
}

impl RegisterDescriptor {
    pub fn new(variable_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            variable_name: variable_name.into(),
            type_name: type_name.into(),
            args: Args::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}
