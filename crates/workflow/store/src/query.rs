//! Entry search expressions
//!
//! A [`StepQuery`] is a boolean expression over entry fields and the
//! fields of an entry's current or history steps. It selects entries,
//! not steps: a step condition holds when any step in the chosen
//! partition satisfies it.

use serde::{Deserialize, Serialize};
use workflow_types::{EntryState, Step, WorkflowEntry};

/// Which step partition a condition looks at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryContext {
    Current,
    History,
}

/// Equality test on one step field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldCondition {
    StepDefId(i32),
    ActionId(i32),
    Owner(String),
    Caller(String),
    Status(String),
}

impl FieldCondition {
    pub fn matches(&self, step: &Step) -> bool {
        match self {
            Self::StepDefId(id) => step.step_def_id == *id,
            Self::ActionId(id) => step.action_id == *id,
            Self::Owner(owner) => step.owner.as_deref() == Some(owner.as_str()),
            Self::Caller(caller) => step.caller.as_deref() == Some(caller.as_str()),
            Self::Status(status) => step.status == *status,
        }
    }
}

/// Boolean search expression over entries
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepQuery {
    Step {
        context: QueryContext,
        condition: FieldCondition,
    },
    WorkflowName(String),
    EntryState(EntryState),
    /// Empty conjunction matches everything
    And(Vec<StepQuery>),
    /// Empty disjunction matches nothing
    Or(Vec<StepQuery>),
    Not(Box<StepQuery>),
}

impl StepQuery {
    pub fn current(condition: FieldCondition) -> Self {
        Self::Step {
            context: QueryContext::Current,
            condition,
        }
    }

    pub fn history(condition: FieldCondition) -> Self {
        Self::Step {
            context: QueryContext::History,
            condition,
        }
    }

    /// Evaluate against one entry and its two step partitions
    pub fn matches(&self, entry: &WorkflowEntry, current: &[Step], history: &[Step]) -> bool {
        match self {
            Self::Step { context, condition } => {
                let steps = match context {
                    QueryContext::Current => current,
                    QueryContext::History => history,
                };
                steps.iter().any(|s| condition.matches(s))
            }
            Self::WorkflowName(name) => entry.workflow_name == *name,
            Self::EntryState(state) => entry.state == *state,
            Self::And(parts) => parts.iter().all(|q| q.matches(entry, current, history)),
            Self::Or(parts) => parts.iter().any(|q| q.matches(entry, current, history)),
            Self::Not(inner) => !inner.matches(entry, current, history),
        }
    }
}
