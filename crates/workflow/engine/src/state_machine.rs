//! State machine: executes one action against an entry
//!
//! This is the heart of the workflow engine. For a chosen action it picks
//! the step being left, selects exactly one result, and dispatches it as
//! a plain transition, a split (fan-out) or a join (barrier). Mutations
//! happen in a fixed order:
//!
//! 1. resolve the leaving step
//! 2. action validators
//! 3. leaving step's post-functions
//! 4. action pre-functions
//! 5. result selection, then the result's validators and pre-functions
//! 6. dispatch (split / join / plain)
//! 7. result post-functions, then action post-functions
//! 8. activate the entry if this was an initial action
//! 9. complete the entry if the action finishes it
//!
//! A failure at any point stops the sequence. Nothing already written is
//! undone here; the caller signals rollback to the ambient transaction.

use crate::availability::{self, AvailabilityCache};
use crate::resolver::{render, translate_args};
use crate::{
    ConditionEvaluator, EngineConfig, EntryLifecycle, ExtensionRegistry, JoinNodes,
    TransientScope, VariableResolver, WorkflowError, WorkflowResult,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use workflow_store::{NewStep, PropertySet, WorkflowStore};
use workflow_types::{
    ActionScope, DescriptorError, EntryState, FunctionDescriptor, ResultDescriptor, ResultTarget,
    ScopedAction, Step, StepId, ValidatorDescriptor, SAME_STEP,
};

/// How an executed action left the entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The entry is still running
    Continued,
    /// A finish action completed the entry
    Finished,
}

/// Executes actions: result selection, split/join dispatch, step creation
#[derive(Clone, Debug)]
pub struct StateMachine {
    evaluator: ConditionEvaluator,
    lifecycle: EntryLifecycle,
    config: EngineConfig,
}

impl StateMachine {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        resolver: Arc<dyn VariableResolver>,
        store: Arc<dyn WorkflowStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            evaluator: ConditionEvaluator::new(registry, resolver),
            lifecycle: EntryLifecycle::new(store, config.finished_status.clone()),
            config,
        }
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    pub fn lifecycle(&self) -> &EntryLifecycle {
        &self.lifecycle
    }

    /// Memoized availability check, see [`availability::is_available`]
    pub fn is_available(
        &self,
        cache: &mut AvailabilityCache,
        action: ScopedAction<'_>,
        scope: &mut TransientScope,
        ps: &PropertySet,
        step_id: i32,
    ) -> WorkflowResult<bool> {
        availability::is_available(&self.evaluator, cache, action, scope, ps, step_id)
    }

    /// Execute `action` against the entry in `scope`.
    ///
    /// The caller has already established that the action is valid. The
    /// scope's `current_steps` must be the snapshot taken for this call.
    pub fn execute_action(
        &self,
        cache: &mut AvailabilityCache,
        action: ScopedAction<'_>,
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<TransitionOutcome> {
        let descriptor = Arc::clone(&scope.descriptor);
        let entry_id = scope.entry.id;
        scope.action_id = Some(action.id());

        let leaving = self.find_leaving_step(cache, action.id(), scope, ps)?;
        let guard_step_id = leaving.as_ref().map_or(-1, |s| s.step_def_id);
        tracing::info!(
            entry_id = %entry_id,
            action_id = action.id(),
            leaving_step = ?leaving.as_ref().map(|s| s.id),
            "Executing action"
        );

        self.run_validators(&action.action.validators, scope, ps)?;

        if let Some(step) = &leaving {
            let step_def = descriptor
                .get_step(step.step_def_id)
                .ok_or(WorkflowError::StepNotFound(step.step_def_id))?;
            self.execute_functions(&step_def.post_functions, scope, ps)?;
        }

        self.execute_functions(&action.action.pre_functions, scope, ps)?;

        let result = self.select_result(action, scope, ps, guard_step_id)?;
        self.run_validators(&result.validators, scope, ps)?;
        self.execute_functions(&result.pre_functions, scope, ps)?;

        match result.target {
            ResultTarget::Split(split_id) => {
                self.dispatch_split(split_id, action, leaving.as_ref(), scope, ps)?
            }
            ResultTarget::Join(join_id) => {
                self.dispatch_join(join_id, action, result, leaving.as_ref(), scope, ps)?
            }
            ResultTarget::Step(_) => self.dispatch_plain(action, result, leaving.as_ref(), scope, ps)?,
        }

        self.execute_functions(&result.post_functions, scope, ps)?;
        self.execute_functions(&action.action.post_functions, scope, ps)?;

        if action.scope == ActionScope::Initial && scope.entry.state != EntryState::Activated {
            self.lifecycle
                .change_state(entry_id, EntryState::Activated, scope.caller())?;
            scope.entry.state = EntryState::Activated;
        }

        if action.action.finish {
            self.lifecycle.complete(entry_id, action.id(), scope.caller())?;
            scope.entry.state = EntryState::Completed;
            tracing::info!(entry_id = %entry_id, action_id = action.id(), "Entry finished by action");
            return Ok(TransitionOutcome::Finished);
        }

        Ok(TransitionOutcome::Continued)
    }

    // ── Step 1 and 5 ─────────────────────────────────────────────────

    /// The only current step, or else the first current step offering the
    /// action in an available state. `None` for initial and global actions
    /// that no step claims.
    fn find_leaving_step(
        &self,
        cache: &mut AvailabilityCache,
        action_id: i32,
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<Option<Step>> {
        let current = scope.current_steps.clone();
        if current.len() == 1 {
            return Ok(current.into_iter().next());
        }

        let descriptor = Arc::clone(&scope.descriptor);
        for step in current {
            if let Some(candidate) = descriptor.action_for_step(step.step_def_id, action_id) {
                if self.is_available(cache, candidate, scope, ps, step.step_def_id)? {
                    return Ok(Some(step));
                }
            }
        }
        Ok(None)
    }

    /// First passing conditional result, else the unconditional one
    fn select_result<'a>(
        &self,
        action: ScopedAction<'a>,
        scope: &TransientScope,
        ps: &PropertySet,
        step_id: i32,
    ) -> WorkflowResult<&'a ResultDescriptor> {
        for (index, conditional) in action.action.conditional_results.iter().enumerate() {
            if self
                .evaluator
                .evaluate(Some(&conditional.conditions), scope, ps, step_id)?
            {
                tracing::debug!(
                    action_id = action.id(),
                    index,
                    target = %conditional.result.target,
                    "Conditional result selected"
                );
                return Ok(&conditional.result);
            }
        }

        let fallback = action
            .action
            .unconditional_result
            .as_ref()
            .ok_or(DescriptorError::MissingUnconditionalResult(action.id()))?;
        tracing::debug!(
            action_id = action.id(),
            target = %fallback.target,
            "Unconditional result selected"
        );
        Ok(fallback)
    }

    // ── Step 6: dispatch ─────────────────────────────────────────────

    fn dispatch_split(
        &self,
        split_id: i32,
        action: ScopedAction<'_>,
        leaving: Option<&Step>,
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<()> {
        let descriptor = Arc::clone(&scope.descriptor);
        let split = descriptor
            .get_split(split_id)
            .ok_or(DescriptorError::SplitNotFound(split_id))?;

        for sibling in &split.results {
            self.run_validators(&sibling.validators, scope, ps)?;
        }
        self.execute_functions(
            split.results.iter().flat_map(|r| r.pre_functions.iter()),
            scope,
            ps,
        )?;

        if !action.action.finish {
            let previous: Vec<StepId> = leaving.iter().map(|s| s.id).collect();
            // Only the first sibling closes the leaving step
            for (index, sibling) in split.results.iter().enumerate() {
                self.create_new_current_step(
                    sibling,
                    action.id(),
                    leaving,
                    index == 0,
                    &previous,
                    scope,
                    ps,
                )?;
            }
        }

        self.execute_functions(
            split.results.iter().flat_map(|r| r.post_functions.iter()),
            scope,
            ps,
        )?;

        tracing::debug!(
            entry_id = %scope.entry.id,
            split_id,
            branches = split.results.len(),
            "Split dispatched"
        );
        Ok(())
    }

    fn dispatch_join(
        &self,
        join_id: i32,
        action: ScopedAction<'_>,
        result: &ResultDescriptor,
        leaving: Option<&Step>,
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<()> {
        let descriptor = Arc::clone(&scope.descriptor);
        let store = Arc::clone(&scope.store);
        let join = descriptor
            .get_join(join_id)
            .ok_or(DescriptorError::JoinNotFound(join_id))?;
        let join_result = join
            .result
            .as_ref()
            .ok_or(DescriptorError::MissingJoinResult(join_id))?;

        // The arriving branch is closed whether or not the join fires
        let mut branches = Vec::new();
        if let Some(step) = leaving {
            let old_status = self.old_status(result, scope, ps);
            branches.push(self.close_step(step, action.id(), &old_status, scope)?);
        }

        let leaving_id = leaving.map(|s| s.id);
        let feeds_join = |step: &Step| {
            Some(step.id) != leaving_id && descriptor.results_in_join(step.step_def_id, join_id)
        };
        let still_current: Vec<Step> = scope
            .current_steps
            .iter()
            .filter(|&s| feeds_join(s))
            .cloned()
            .collect();
        branches.extend(still_current.iter().cloned());
        branches.extend(
            store
                .find_history_steps(scope.entry.id)?
                .into_iter()
                .filter(|s| feeds_join(s)),
        );

        let nodes = JoinNodes::new(branches);
        scope.join_nodes = Some(nodes.clone());

        if !self
            .evaluator
            .evaluate(Some(&join.conditions), scope, ps, 0)?
        {
            tracing::warn!(
                entry_id = %scope.entry.id,
                join_id,
                arrived = nodes.steps().len(),
                "Join condition not met, waiting for remaining branches"
            );
            scope.join_nodes = None;
            return Ok(());
        }

        self.run_validators(&join_result.validators, scope, ps)?;
        self.execute_functions(&join_result.pre_functions, scope, ps)?;

        for step in &still_current {
            store.move_to_history(step)?;
        }

        if !action.action.finish {
            self.create_new_current_step(
                join_result,
                action.id(),
                leaving,
                false,
                &nodes.ids(),
                scope,
                ps,
            )?;
        }

        self.execute_functions(&join_result.post_functions, scope, ps)?;
        scope.join_nodes = None;

        tracing::debug!(
            entry_id = %scope.entry.id,
            join_id,
            branches = nodes.steps().len(),
            "Join passed"
        );
        Ok(())
    }

    fn dispatch_plain(
        &self,
        action: ScopedAction<'_>,
        result: &ResultDescriptor,
        leaving: Option<&Step>,
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<()> {
        if action.action.finish {
            if let Some(step) = leaving {
                let old_status = self.old_status(result, scope, ps);
                self.close_step(step, action.id(), &old_status, scope)?;
            }
            return Ok(());
        }

        let previous: Vec<StepId> = leaving.iter().map(|s| s.id).collect();
        self.create_new_current_step(result, action.id(), leaving, true, &previous, scope, ps)?;
        Ok(())
    }

    // ── Step creation ────────────────────────────────────────────────

    /// Create the step a result points at, optionally closing the leaving
    /// step first. Runs the new step definition's pre-functions.
    #[allow(clippy::too_many_arguments)]
    fn create_new_current_step(
        &self,
        result: &ResultDescriptor,
        action_id: i32,
        leaving: Option<&Step>,
        close_leaving: bool,
        previous_ids: &[StepId],
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<Step> {
        let next_step = match result.target {
            ResultTarget::Step(SAME_STEP) => leaving.map(|s| s.step_def_id).ok_or_else(|| {
                WorkflowError::Configuration(format!(
                    "action {} stays in the same step but no step is being left",
                    action_id
                ))
            })?,
            ResultTarget::Step(id) => id,
            other => {
                return Err(WorkflowError::Configuration(format!(
                    "result targeting {} cannot create a step",
                    other
                )))
            }
        };
        let descriptor = Arc::clone(&scope.descriptor);
        let step_def = descriptor
            .get_step(next_step)
            .ok_or(WorkflowError::StepNotFound(next_step))?;

        let owner = match result.owner.as_deref() {
            Some(template) => Some(self.translate(template, scope, ps)).filter(|o| !o.is_empty()),
            None => None,
        };
        let status = self.translate(&result.status, scope, ps);
        let now = Utc::now();
        let due_date = match result.due_date.as_deref() {
            Some(template) => self.resolve_due_date(template, now, scope, ps),
            None => None,
        };

        if close_leaving {
            if let Some(step) = leaving {
                let old_status = self.old_status(result, scope, ps);
                self.close_step(step, action_id, &old_status, scope)?;
            }
        }

        let created = scope.store.create_current_step(NewStep {
            entry_id: scope.entry.id,
            step_def_id: next_step,
            owner,
            start_date: now,
            due_date,
            status,
            previous_step_ids: previous_ids.to_vec(),
        })?;
        tracing::debug!(
            entry_id = %scope.entry.id,
            step_id = %created.id,
            step_def_id = next_step,
            "Step created"
        );

        scope.created_step = Some(created.clone());
        if leaving.is_none() {
            scope.current_steps.push(created.clone());
        }

        self.execute_functions(&step_def.pre_functions, scope, ps)?;
        Ok(created)
    }

    fn close_step(
        &self,
        step: &Step,
        action_id: i32,
        status: &str,
        scope: &TransientScope,
    ) -> WorkflowResult<Step> {
        let finished =
            scope
                .store
                .mark_finished(step, action_id, Utc::now(), status, scope.caller())?;
        scope.store.move_to_history(step)?;
        tracing::debug!(
            entry_id = %step.entry_id,
            step_id = %step.id,
            action_id,
            status,
            "Step closed"
        );
        Ok(finished)
    }

    /// Interpolated old-status of a result, or the configured finished status
    fn old_status(&self, result: &ResultDescriptor, scope: &TransientScope, ps: &PropertySet) -> String {
        let status = self.translate(&result.old_status, scope, ps);
        if status.is_empty() {
            self.config.finished_status.clone()
        } else {
            status
        }
    }

    fn translate(&self, template: &str, scope: &TransientScope, ps: &PropertySet) -> String {
        render(
            self.evaluator
                .resolver()
                .translate_variables(template, scope, ps),
        )
    }

    /// A due date is an absolute RFC 3339 date or a positive millisecond
    /// offset from `now`. Anything else yields no due date.
    fn resolve_due_date(
        &self,
        template: &str,
        now: DateTime<Utc>,
        scope: &TransientScope,
        ps: &PropertySet,
    ) -> Option<DateTime<Utc>> {
        let offset = |ms: i64| {
            if ms > 0 {
                now.checked_add_signed(Duration::milliseconds(ms))
            } else {
                None
            }
        };

        match self
            .evaluator
            .resolver()
            .translate_variables(template, scope, ps)?
        {
            Value::Number(n) => n.as_i64().and_then(offset),
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(ms) => offset(ms),
                    Err(_) => DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|d| d.with_timezone(&Utc)),
                }
            }
            _ => None,
        }
    }

    // ── Extensions ───────────────────────────────────────────────────

    fn run_validators(
        &self,
        validators: &[ValidatorDescriptor],
        scope: &TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<()> {
        for descriptor in validators {
            let args = translate_args(self.evaluator.resolver(), &descriptor.args, scope, ps);
            let validator = self
                .evaluator
                .registry()
                .resolve_validator(&descriptor.type_name, &args)?;
            validator.validate(scope, &args, ps)?;
        }
        Ok(())
    }

    fn execute_functions<'f>(
        &self,
        functions: impl IntoIterator<Item = &'f FunctionDescriptor>,
        scope: &mut TransientScope,
        ps: &PropertySet,
    ) -> WorkflowResult<()> {
        for descriptor in functions {
            let args = translate_args(self.evaluator.resolver(), &descriptor.args, scope, ps);
            let function = self
                .evaluator
                .registry()
                .resolve_function(&descriptor.type_name, &args)?;
            tracing::trace!(function = %descriptor.type_name, "Executing function");
            function.execute(scope, &args, ps)?;
        }
        Ok(())
    }
}
