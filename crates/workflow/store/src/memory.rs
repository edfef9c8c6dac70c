//! In-memory reference implementation of [`WorkflowStore`].
//!
//! This adapter is deterministic and test-friendly: ids are assigned
//! sequentially starting at 1 and nothing survives the process.

use crate::traits::{NewStep, WorkflowStore};
use crate::{PropertySet, StepQuery, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use workflow_types::{EntryId, EntryState, Step, StepId, WorkflowEntry};

#[derive(Default)]
struct MemoryState {
    next_entry_id: u64,
    next_step_id: u64,
    entries: BTreeMap<EntryId, WorkflowEntry>,
    current: HashMap<EntryId, Vec<Step>>,
    history: HashMap<EntryId, Vec<Step>>,
    properties: HashMap<EntryId, PropertySet>,
}

/// In-memory workflow store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<MemoryState>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("workflow store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("workflow store lock poisoned".to_string()))
    }
}

fn entry_not_found(entry_id: EntryId) -> StoreError {
    StoreError::NotFound(format!("entry {} not found", entry_id))
}

fn current_step_not_found(step: &Step) -> StoreError {
    StoreError::NotFound(format!(
        "current step {} of entry {} not found",
        step.id, step.entry_id
    ))
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn create_entry(&self, workflow_name: &str) -> StoreResult<WorkflowEntry> {
        if workflow_name.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "workflow name must not be empty".to_string(),
            ));
        }
        let mut guard = self.write()?;
        guard.next_entry_id += 1;
        let entry = WorkflowEntry::new(EntryId(guard.next_entry_id), workflow_name);
        guard.entries.insert(entry.id, entry.clone());
        guard.properties.insert(entry.id, PropertySet::new());
        Ok(entry)
    }

    fn find_entry(&self, entry_id: EntryId) -> StoreResult<Option<WorkflowEntry>> {
        let guard = self.read()?;
        Ok(guard.entries.get(&entry_id).cloned())
    }

    fn set_entry_state(&self, entry_id: EntryId, state: EntryState) -> StoreResult<()> {
        let mut guard = self.write()?;
        let entry = guard
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| entry_not_found(entry_id))?;
        entry.state = state;
        Ok(())
    }

    fn create_current_step(&self, step: NewStep) -> StoreResult<Step> {
        let mut guard = self.write()?;
        if !guard.entries.contains_key(&step.entry_id) {
            return Err(entry_not_found(step.entry_id));
        }
        guard.next_step_id += 1;
        let created = Step {
            id: StepId(guard.next_step_id),
            entry_id: step.entry_id,
            step_def_id: step.step_def_id,
            action_id: 0,
            owner: step.owner,
            caller: None,
            status: step.status,
            start_date: step.start_date,
            due_date: step.due_date,
            finish_date: None,
            previous_step_ids: step.previous_step_ids,
        };
        guard
            .current
            .entry(step.entry_id)
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    fn find_current_steps(&self, entry_id: EntryId) -> StoreResult<Vec<Step>> {
        let guard = self.read()?;
        Ok(guard.current.get(&entry_id).cloned().unwrap_or_default())
    }

    fn find_history_steps(&self, entry_id: EntryId) -> StoreResult<Vec<Step>> {
        let guard = self.read()?;
        Ok(guard.history.get(&entry_id).cloned().unwrap_or_default())
    }

    fn mark_finished(
        &self,
        step: &Step,
        action_id: i32,
        finish_date: DateTime<Utc>,
        status: &str,
        caller: Option<&str>,
    ) -> StoreResult<Step> {
        let mut guard = self.write()?;
        let stored = guard
            .current
            .get_mut(&step.entry_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.id == step.id))
            .ok_or_else(|| current_step_not_found(step))?;
        stored.action_id = action_id;
        stored.finish_date = Some(finish_date);
        stored.status = status.to_string();
        stored.caller = caller.map(str::to_string);
        Ok(stored.clone())
    }

    fn move_to_history(&self, step: &Step) -> StoreResult<()> {
        let mut guard = self.write()?;
        let steps = guard
            .current
            .get_mut(&step.entry_id)
            .ok_or_else(|| current_step_not_found(step))?;
        let position = steps
            .iter()
            .position(|s| s.id == step.id)
            .ok_or_else(|| current_step_not_found(step))?;
        let moved = steps.remove(position);
        guard.history.entry(step.entry_id).or_default().push(moved);
        Ok(())
    }

    fn property_set(&self, entry_id: EntryId) -> StoreResult<PropertySet> {
        let guard = self.read()?;
        guard
            .properties
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| entry_not_found(entry_id))
    }

    fn query(&self, query: &StepQuery) -> StoreResult<Vec<EntryId>> {
        let guard = self.read()?;
        let empty = Vec::new();
        Ok(guard
            .entries
            .values()
            .filter(|entry| {
                let current = guard.current.get(&entry.id).unwrap_or(&empty);
                let history = guard.history.get(&entry.id).unwrap_or(&empty);
                query.matches(entry, current, history)
            })
            .map(|entry| entry.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldCondition;
    use proptest::prelude::*;

    fn new_step(entry_id: EntryId, step_def_id: i32, previous: Vec<StepId>) -> NewStep {
        NewStep {
            entry_id,
            step_def_id,
            owner: Some("alice".to_string()),
            start_date: Utc::now(),
            due_date: None,
            status: "Underway".to_string(),
            previous_step_ids: previous,
        }
    }

    #[test]
    fn test_create_entry_assigns_sequential_ids() {
        let store = InMemoryWorkflowStore::new();
        let a = store.create_entry("expense").unwrap();
        let b = store.create_entry("expense").unwrap();
        assert_eq!(a.id, EntryId(1));
        assert_eq!(b.id, EntryId(2));
        assert_eq!(a.state, EntryState::Created);
        assert!(store.create_entry("  ").is_err());
    }

    #[test]
    fn test_set_entry_state() {
        let store = InMemoryWorkflowStore::new();
        let entry = store.create_entry("expense").unwrap();
        store
            .set_entry_state(entry.id, EntryState::Activated)
            .unwrap();
        let found = store.find_entry(entry.id).unwrap().unwrap();
        assert_eq!(found.state, EntryState::Activated);

        let missing = store.set_entry_state(EntryId(99), EntryState::Killed);
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
        assert!(store.find_entry(EntryId(99)).unwrap().is_none());
    }

    #[test]
    fn test_finish_then_move_to_history() {
        let store = InMemoryWorkflowStore::new();
        let entry = store.create_entry("expense").unwrap();
        let step = store.create_current_step(new_step(entry.id, 1, vec![])).unwrap();
        assert_eq!(step.action_id, 0);

        let finished = store
            .mark_finished(&step, 10, Utc::now(), "Finished", Some("bob"))
            .unwrap();
        assert_eq!(finished.action_id, 10);
        assert_eq!(finished.caller.as_deref(), Some("bob"));
        assert_eq!(store.find_current_steps(entry.id).unwrap().len(), 1);

        store.move_to_history(&step).unwrap();
        assert!(store.find_current_steps(entry.id).unwrap().is_empty());
        let history = store.find_history_steps(entry.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "Finished");
        assert!(history[0].is_finished());

        assert!(matches!(
            store.move_to_history(&step),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_property_set_is_shared() {
        let store = InMemoryWorkflowStore::new();
        let entry = store.create_entry("expense").unwrap();
        store.property_set(entry.id).unwrap().set("amount", 40);
        let again = store.property_set(entry.id).unwrap();
        assert_eq!(again.get("amount"), Some(serde_json::json!(40)));
        assert!(store.property_set(EntryId(42)).is_err());
    }

    #[test]
    fn test_query_by_owner_and_partition() {
        let store = InMemoryWorkflowStore::new();
        let first = store.create_entry("expense").unwrap();
        let second = store.create_entry("expense").unwrap();
        let step = store.create_current_step(new_step(first.id, 1, vec![])).unwrap();
        store.move_to_history(&step).unwrap();
        store.create_current_step(new_step(second.id, 2, vec![])).unwrap();

        let by_owner = store
            .query(&StepQuery::current(FieldCondition::Owner("alice".into())))
            .unwrap();
        assert_eq!(by_owner, vec![second.id]);

        let by_history = store
            .query(&StepQuery::history(FieldCondition::StepDefId(1)))
            .unwrap();
        assert_eq!(by_history, vec![first.id]);
    }

    proptest! {
        #[test]
        fn prop_steps_live_in_exactly_one_partition(moves in proptest::collection::vec(any::<bool>(), 1..20)) {
            let store = InMemoryWorkflowStore::new();
            let entry = store.create_entry("expense").unwrap();
            let mut previous = Vec::new();
            for (i, move_it) in moves.iter().enumerate() {
                let step = store
                    .create_current_step(new_step(entry.id, i as i32, previous.clone()))
                    .unwrap();
                previous = vec![step.id];
                if *move_it {
                    store.move_to_history(&step).unwrap();
                }
            }

            let current = store.find_current_steps(entry.id).unwrap();
            let history = store.find_history_steps(entry.id).unwrap();
            prop_assert_eq!(current.len() + history.len(), moves.len());
            for step in &current {
                prop_assert!(history.iter().all(|h| h.id != step.id));
            }
            let moved = moves.iter().filter(|m| **m).count();
            prop_assert_eq!(history.len(), moved);
        }
    }
}
