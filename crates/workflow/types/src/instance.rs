//! Workflow entries and their steps
//!
//! A WorkflowEntry is one running instance of a descriptor. Its
//! position is the set of current steps; every step it ever left is
//! kept as a history step, linked to its predecessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ──────────────────────────────────────────────────────

/// Store-assigned identifier of a workflow entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a runtime step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub u64);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Entry State ──────────────────────────────────────────────────────

/// Lifecycle state of a workflow entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryState {
    /// Created but the initial action has not finished yet
    Created,
    Activated,
    Suspended,
    Killed,
    Completed,
    /// Reported for entries the store does not know
    Unknown,
}

impl EntryState {
    /// Whether the lifecycle allows moving from `self` to `target`.
    ///
    /// Same-state moves are not edges; callers treat them as no-ops.
    pub fn can_transition_to(&self, target: EntryState) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Activated)
                | (Self::Activated, Self::Suspended)
                | (Self::Activated, Self::Killed)
                | (Self::Activated, Self::Completed)
                | (Self::Suspended, Self::Activated)
                | (Self::Suspended, Self::Killed)
        )
    }

    /// KILLED and COMPLETED close every current step on entry
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Killed | Self::Completed)
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Activated => write!(f, "ACTIVATED"),
            Self::Suspended => write!(f, "SUSPENDED"),
            Self::Killed => write!(f, "KILLED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ── Workflow Entry ───────────────────────────────────────────────────

/// A running instance of a workflow descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub id: EntryId,
    /// Name of the descriptor this entry executes
    pub workflow_name: String,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
}

impl WorkflowEntry {
    pub fn new(id: EntryId, workflow_name: impl Into<String>) -> Self {
        Self {
            id,
            workflow_name: workflow_name.into(),
            state: EntryState::Created,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == EntryState::Activated
    }
}

// ── Step ─────────────────────────────────────────────────────────────

/// A position held by an entry. Current while open, history once left.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub entry_id: EntryId,
    /// Step definition id within the entry's descriptor
    pub step_def_id: i32,
    /// Action that closed the step; 0 while open
    pub action_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Who closed the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    pub status: String,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<DateTime<Utc>>,
    /// Steps this one was entered from
    #[serde(default)]
    pub previous_step_ids: Vec<StepId>,
}

impl Step {
    pub fn is_finished(&self) -> bool {
        self.finish_date.is_some()
    }
}
