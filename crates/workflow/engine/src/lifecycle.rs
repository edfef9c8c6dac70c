//! Entry lifecycle: the only place entry states change
//!
//! Legal edges are defined by [`EntryState::can_transition_to`]. Entering
//! a terminal state first closes every open step so that a finished entry
//! never has current steps.

use crate::{WorkflowError, WorkflowResult};
use chrono::Utc;
use std::sync::Arc;
use workflow_store::WorkflowStore;
use workflow_types::{EntryId, EntryState};

/// Applies lifecycle changes through the store
#[derive(Clone)]
pub struct EntryLifecycle {
    store: Arc<dyn WorkflowStore>,
    finished_status: String,
}

impl EntryLifecycle {
    pub fn new(store: Arc<dyn WorkflowStore>, finished_status: impl Into<String>) -> Self {
        Self {
            store,
            finished_status: finished_status.into(),
        }
    }

    /// Move an entry to `target`.
    ///
    /// Returns `false` when the entry is already in `target`. Illegal
    /// edges fail without touching the store. Steps closed on the way to a
    /// terminal state record action id 0.
    pub fn change_state(
        &self,
        entry_id: EntryId,
        target: EntryState,
        caller: Option<&str>,
    ) -> WorkflowResult<bool> {
        self.transition(entry_id, target, 0, caller)
    }

    /// Complete the entry on behalf of `action_id`, closing whatever is
    /// still open
    pub fn complete(
        &self,
        entry_id: EntryId,
        action_id: i32,
        caller: Option<&str>,
    ) -> WorkflowResult<bool> {
        self.transition(entry_id, EntryState::Completed, action_id, caller)
    }

    fn transition(
        &self,
        entry_id: EntryId,
        target: EntryState,
        action_id: i32,
        caller: Option<&str>,
    ) -> WorkflowResult<bool> {
        let entry = self
            .store
            .find_entry(entry_id)?
            .ok_or(WorkflowError::EntryNotFound(entry_id))?;

        if entry.state == target {
            tracing::debug!(entry_id = %entry_id, state = %target, "Entry already in requested state");
            return Ok(false);
        }
        if !entry.state.can_transition_to(target) {
            return Err(WorkflowError::InvalidEntryState {
                entry_id,
                from: entry.state,
                to: target,
            });
        }

        if target.is_terminal() {
            self.close_current_steps(entry_id, action_id, caller)?;
        }
        self.store.set_entry_state(entry_id, target)?;

        tracing::info!(
            entry_id = %entry_id,
            from = %entry.state,
            to = %target,
            "Entry state changed"
        );
        Ok(true)
    }

    fn close_current_steps(
        &self,
        entry_id: EntryId,
        action_id: i32,
        caller: Option<&str>,
    ) -> WorkflowResult<()> {
        let now = Utc::now();
        for step in self.store.find_current_steps(entry_id)? {
            self.store
                .mark_finished(&step, action_id, now, &self.finished_status, caller)?;
            self.store.move_to_history(&step)?;
            tracing::debug!(entry_id = %entry_id, step_id = %step.id, "Step force-closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for EntryLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryLifecycle")
            .field("finished_status", &self.finished_status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_store::{InMemoryWorkflowStore, NewStep};

    fn setup() -> (Arc<InMemoryWorkflowStore>, EntryLifecycle, EntryId) {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let lifecycle = EntryLifecycle::new(store.clone(), "Finished");
        let entry = store.create_entry("test").unwrap();
        (store, lifecycle, entry.id)
    }

    #[test]
    fn test_legal_path() {
        let (store, lifecycle, id) = setup();
        assert!(lifecycle.change_state(id, EntryState::Activated, None).unwrap());
        assert!(lifecycle.change_state(id, EntryState::Suspended, None).unwrap());
        assert!(lifecycle.change_state(id, EntryState::Activated, None).unwrap());
        assert!(lifecycle.change_state(id, EntryState::Killed, None).unwrap());
        assert_eq!(
            store.find_entry(id).unwrap().unwrap().state,
            EntryState::Killed
        );
    }

    #[test]
    fn test_same_state_is_noop() {
        let (_, lifecycle, id) = setup();
        lifecycle.change_state(id, EntryState::Activated, None).unwrap();
        assert!(!lifecycle.change_state(id, EntryState::Activated, None).unwrap());
    }

    #[test]
    fn test_illegal_edge_leaves_state() {
        let (store, lifecycle, id) = setup();
        let result = lifecycle.change_state(id, EntryState::Completed, None);
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidEntryState {
                from: EntryState::Created,
                to: EntryState::Completed,
                ..
            })
        ));
        assert_eq!(
            store.find_entry(id).unwrap().unwrap().state,
            EntryState::Created
        );
    }

    #[test]
    fn test_completion_closes_steps() {
        let (store, lifecycle, id) = setup();
        lifecycle.change_state(id, EntryState::Activated, None).unwrap();
        store
            .create_current_step(NewStep {
                entry_id: id,
                step_def_id: 1,
                owner: None,
                start_date: Utc::now(),
                due_date: None,
                status: "Underway".into(),
                previous_step_ids: vec![],
            })
            .unwrap();

        lifecycle.complete(id, 42, Some("admin")).unwrap();
        assert!(store.find_current_steps(id).unwrap().is_empty());
        let history = store.find_history_steps(id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "Finished");
        assert_eq!(history[0].action_id, 42);
        assert_eq!(history[0].caller.as_deref(), Some("admin"));
    }

    #[test]
    fn test_requested_kill_records_no_action() {
        let (store, lifecycle, id) = setup();
        lifecycle.change_state(id, EntryState::Activated, None).unwrap();
        store
            .create_current_step(NewStep {
                entry_id: id,
                step_def_id: 1,
                owner: None,
                start_date: Utc::now(),
                due_date: None,
                status: "Underway".into(),
                previous_step_ids: vec![],
            })
            .unwrap();

        lifecycle.change_state(id, EntryState::Killed, None).unwrap();
        let history = store.find_history_steps(id).unwrap();
        assert_eq!(history[0].action_id, 0);
    }

    #[test]
    fn test_unknown_entry() {
        let (_, lifecycle, _) = setup();
        assert!(matches!(
            lifecycle.change_state(EntryId(404), EntryState::Activated, None),
            Err(WorkflowError::EntryNotFound(EntryId(404)))
        ));
    }
}
