//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use workflow_engine::{BasicWorkflowContext, WorkflowOrchestrator};
use workflow_store::{
    InMemoryWorkflowStore, NewStep, PropertySet, StepQuery, StoreError, StoreResult,
    WorkflowStore,
};
use workflow_types::*;

/// Orchestrator over a fresh in-memory store, acting as `caller`
pub fn orchestrator_as(caller: &str) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(Arc::new(InMemoryWorkflowStore::new()))
        .with_context(Arc::new(BasicWorkflowContext::new(caller)))
}

pub fn step_def_ids(steps: &[Step]) -> Vec<i32> {
    steps.iter().map(|s| s.step_def_id).collect()
}

pub fn sorted_ids(mut ids: Vec<StepId>) -> Vec<StepId> {
    ids.sort();
    ids
}

/// Draft (1) forks into Legal (2) and Finance (3), which join into
/// Archive (4) once both arrived with status "Done".
pub fn review_with_join() -> WorkflowDescriptor {
    let done = |step: i32| {
        ConditionDescriptor::new("join-status")
            .with_arg("stepId", step.to_string())
            .with_arg("status", "Done")
    };

    WorkflowDescriptor::new("contract-review")
        .with_initial_action(
            ActionDescriptor::new(1, "Submit")
                .with_result(ResultDescriptor::to_step(1).with_status("Underway")),
        )
        .with_step(StepDescriptor::new(1, "Draft").with_action(
            ActionDescriptor::new(10, "Fork").with_result(ResultDescriptor::to_split(1)),
        ))
        .with_split(
            SplitDescriptor::new(1)
                .with_result(ResultDescriptor::to_step(2).with_status("Underway"))
                .with_result(ResultDescriptor::to_step(3).with_status("Underway")),
        )
        .with_step(StepDescriptor::new(2, "Legal").with_action(
            ActionDescriptor::new(20, "Legal OK")
                .with_result(ResultDescriptor::to_join(1).with_old_status("Done")),
        ))
        .with_step(StepDescriptor::new(3, "Finance").with_action(
            ActionDescriptor::new(30, "Finance OK")
                .with_result(ResultDescriptor::to_join(1).with_old_status("Done")),
        ))
        .with_join(
            JoinDescriptor::new(1)
                .with_conditions(
                    ConditionsDescriptor::and()
                        .with_condition(done(2))
                        .with_condition(done(3)),
                )
                .with_result(ResultDescriptor::to_step(4).with_status("Queued")),
        )
        .with_step(StepDescriptor::new(4, "Archive").with_action(
            ActionDescriptor::new(40, "Archive")
                .with_result(ResultDescriptor::to_step(4))
                .finishing(),
        ))
}

/// Step 1 action 10 leads to step 2; step 2's auto action 20 finishes the
/// entry, restricted to the caller "system".
pub fn approval() -> WorkflowDescriptor {
    WorkflowDescriptor::new("approval")
        .with_initial_action(
            ActionDescriptor::new(1, "Start").with_result(ResultDescriptor::to_step(1)),
        )
        .with_step(StepDescriptor::new(1, "Request").with_action(
            ActionDescriptor::new(10, "Submit").with_result(ResultDescriptor::to_step(2)),
        ))
        .with_step(
            StepDescriptor::new(2, "Review").with_action(
                ActionDescriptor::new(20, "Auto approve")
                    .with_restriction(ConditionsDescriptor::single(
                        ConditionDescriptor::new("caller").with_arg("caller", "system"),
                    ))
                    .with_result(ResultDescriptor::to_step(2))
                    .finishing()
                    .auto(),
            ),
        )
}

// ── Failing store ────────────────────────────────────────────────────

/// In-memory store whose step reads fail once `fail_reads` is switched on
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryWorkflowStore,
    fail_reads: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StoreError::Backend("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

impl WorkflowStore for FlakyStore {
    fn create_entry(&self, workflow_name: &str) -> StoreResult<WorkflowEntry> {
        self.inner.create_entry(workflow_name)
    }

    fn find_entry(&self, entry_id: EntryId) -> StoreResult<Option<WorkflowEntry>> {
        self.inner.find_entry(entry_id)
    }

    fn set_entry_state(&self, entry_id: EntryId, state: EntryState) -> StoreResult<()> {
        self.inner.set_entry_state(entry_id, state)
    }

    fn create_current_step(&self, step: NewStep) -> StoreResult<Step> {
        self.inner.create_current_step(step)
    }

    fn find_current_steps(&self, entry_id: EntryId) -> StoreResult<Vec<Step>> {
        self.check()?;
        self.inner.find_current_steps(entry_id)
    }

    fn find_history_steps(&self, entry_id: EntryId) -> StoreResult<Vec<Step>> {
        self.check()?;
        self.inner.find_history_steps(entry_id)
    }

    fn mark_finished(
        &self,
        step: &Step,
        action_id: i32,
        finish_date: DateTime<Utc>,
        status: &str,
        caller: Option<&str>,
    ) -> StoreResult<Step> {
        self.inner
            .mark_finished(step, action_id, finish_date, status, caller)
    }

    fn move_to_history(&self, step: &Step) -> StoreResult<()> {
        self.inner.move_to_history(step)
    }

    fn property_set(&self, entry_id: EntryId) -> StoreResult<PropertySet> {
        self.inner.property_set(entry_id)
    }

    fn query(&self, query: &StepQuery) -> StoreResult<Vec<EntryId>> {
        self.inner.query(query)
    }
}
