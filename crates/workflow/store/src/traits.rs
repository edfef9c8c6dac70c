use crate::{PropertySet, StepQuery, StoreResult};
use chrono::{DateTime, Utc};
use workflow_types::{EntryId, EntryState, Step, StepId, WorkflowEntry};

/// Fields of a step about to be created in the current partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStep {
    pub entry_id: EntryId,
    pub step_def_id: i32,
    pub owner: Option<String>,
    pub start_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: String,
    pub previous_step_ids: Vec<StepId>,
}

/// Persistence interface for workflow entries and their steps.
///
/// Every step lives in exactly one of two partitions: current or history.
/// Calls block the caller until the backend answers.
pub trait WorkflowStore: Send + Sync {
    /// Create an entry in the CREATED state with a fresh id.
    fn create_entry(&self, workflow_name: &str) -> StoreResult<WorkflowEntry>;

    /// Get one entry by id.
    fn find_entry(&self, entry_id: EntryId) -> StoreResult<Option<WorkflowEntry>>;

    /// Overwrite the lifecycle state. Edge legality is the engine's concern.
    fn set_entry_state(&self, entry_id: EntryId, state: EntryState) -> StoreResult<()>;

    /// Insert a step into the current partition and return it with its id.
    fn create_current_step(&self, step: NewStep) -> StoreResult<Step>;

    fn find_current_steps(&self, entry_id: EntryId) -> StoreResult<Vec<Step>>;

    /// History steps, oldest first.
    fn find_history_steps(&self, entry_id: EntryId) -> StoreResult<Vec<Step>>;

    /// Record how a current step was closed. The step stays current until
    /// [`WorkflowStore::move_to_history`] is called.
    fn mark_finished(
        &self,
        step: &Step,
        action_id: i32,
        finish_date: DateTime<Utc>,
        status: &str,
        caller: Option<&str>,
    ) -> StoreResult<Step>;

    /// Move a current step to the history partition.
    fn move_to_history(&self, step: &Step) -> StoreResult<()>;

    /// Property set of an entry. Handles share state with the store.
    fn property_set(&self, entry_id: EntryId) -> StoreResult<PropertySet>;

    /// Ids of entries matching the expression, ascending.
    fn query(&self, query: &StepQuery) -> StoreResult<Vec<EntryId>>;
}
