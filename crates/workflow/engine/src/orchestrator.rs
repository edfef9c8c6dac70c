//! Workflow Orchestrator: the main entry point for the workflow engine
//!
//! The orchestrator wraps the [`StateMachine`] with descriptor and store
//! lookups. It:
//! 1. Registers workflow descriptors
//! 2. Initializes entries through an initial action
//! 3. Executes requested actions, then implicit finish and auto-chaining
//! 4. Answers read-only questions about entries
//!
//! Mutating calls signal rollback through the [`WorkflowContext`] before
//! an error propagates. Read-only listings log store failures and answer
//! with an empty result instead.

use crate::resolver::translate_args;
use crate::{
    AvailabilityCache, BasicWorkflowContext, DefaultVariableResolver, DescriptorRegistry,
    EngineConfig, ExtensionRegistry, Inputs, StateMachine, TransientScope, TransitionOutcome,
    VariableResolver, WorkflowContext, WorkflowError, WorkflowResult,
};
use std::sync::Arc;
use workflow_store::{PropertySet, StepQuery, WorkflowStore};
use workflow_types::{
    ActionScope, EntryId, EntryState, ScopedAction, Step, WorkflowDescriptor, WorkflowEntry,
};

/// Public facade over descriptors, store and transition engine.
///
/// Cloning is cheap; clones share the store, extensions and context but
/// hold their own snapshot of the descriptor registry.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    descriptors: DescriptorRegistry,
    extensions: Arc<ExtensionRegistry>,
    resolver: Arc<dyn VariableResolver>,
    context: Arc<dyn WorkflowContext>,
    config: EngineConfig,
}

impl WorkflowOrchestrator {
    /// Orchestrator with the built-in extensions, the default resolver and
    /// an anonymous caller
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            descriptors: DescriptorRegistry::new(),
            extensions: Arc::new(ExtensionRegistry::with_builtins()),
            resolver: Arc::new(DefaultVariableResolver),
            context: Arc::new(BasicWorkflowContext::anonymous()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn VariableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_context(mut self, context: Arc<dyn WorkflowContext>) -> Self {
        self.context = context;
        self
    }

    /// The same orchestrator acting for another caller
    pub fn as_caller(&self, context: Arc<dyn WorkflowContext>) -> Self {
        self.clone().with_context(context)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<dyn WorkflowContext> {
        &self.context
    }

    // ── Descriptor Management ────────────────────────────────────────

    /// Validate and register a workflow descriptor
    pub fn register_descriptor(&mut self, descriptor: WorkflowDescriptor) -> WorkflowResult<()> {
        self.descriptors.register(descriptor).map(|_| ())
    }

    pub fn get_workflow_descriptor(&self, name: &str) -> WorkflowResult<Arc<WorkflowDescriptor>> {
        self.descriptors.get(name)
    }

    pub fn get_workflow_names(&self) -> Vec<String> {
        self.descriptors.names()
    }

    // ── Entry Lifecycle ──────────────────────────────────────────────

    /// Create an entry and run `initial_action_id` on it.
    ///
    /// Only the action's restriction is checked; global conditions need a
    /// step context and are skipped here.
    pub fn initialize(
        &self,
        workflow_name: &str,
        initial_action_id: i32,
        inputs: Inputs,
    ) -> WorkflowResult<EntryId> {
        let descriptor = self.descriptors.get(workflow_name)?;
        let action = descriptor
            .get_initial_action(initial_action_id)
            .ok_or_else(|| {
                WorkflowError::InvalidAction(format!(
                    "{} is not an initial action of '{}'",
                    initial_action_id, workflow_name
                ))
            })?;

        let entry = self
            .store
            .create_entry(workflow_name)
            .map_err(WorkflowError::from);
        let entry = self.rollback_on(entry)?;
        let entry_id = entry.id;
        tracing::info!(entry_id = %entry_id, workflow = %workflow_name, "Entry created");

        let action = ScopedAction::new(ActionScope::Initial, action);
        let outcome = self.run_initial(entry, &descriptor, action, inputs);
        if let Err(e) = &outcome {
            self.signal_rollback(e);
        }
        outcome.map(|_| entry_id)
    }

    fn run_initial(
        &self,
        entry: WorkflowEntry,
        descriptor: &Arc<WorkflowDescriptor>,
        action: ScopedAction<'_>,
        inputs: Inputs,
    ) -> WorkflowResult<()> {
        let entry_id = entry.id;
        let ps = self.store.property_set(entry_id)?;
        let mut scope =
            self.build_scope(entry, Arc::clone(descriptor), Vec::new(), inputs.clone(), &ps)?;
        let machine = self.state_machine();

        if !machine
            .evaluator()
            .evaluate(action.action.restriction.as_ref(), &scope, &ps, 0)?
        {
            return Err(WorkflowError::Unauthorized(format!(
                "caller '{}' may not start '{}' with action {}",
                scope.caller().unwrap_or("anonymous"),
                descriptor.name,
                action.id()
            )));
        }

        let mut cache = AvailabilityCache::new();
        let outcome = machine.execute_action(&mut cache, action, &mut scope, &ps)?;
        self.after_transition(&machine, outcome, entry_id, action.id(), inputs, 0)
    }

    /// Whether the caller could initialize `workflow_name` with the action.
    /// Nothing is created; any failure answers `false`.
    pub fn can_initialize(&self, workflow_name: &str, initial_action_id: i32, inputs: Inputs) -> bool {
        let check = || -> WorkflowResult<bool> {
            let descriptor = self.descriptors.get(workflow_name)?;
            let Some(action) = descriptor.get_initial_action(initial_action_id) else {
                return Ok(false);
            };
            let ps = PropertySet::new();
            let entry = WorkflowEntry::new(EntryId(0), workflow_name);
            let scope = self.build_scope(entry, Arc::clone(&descriptor), Vec::new(), inputs, &ps)?;
            self.state_machine()
                .evaluator()
                .evaluate(action.restriction.as_ref(), &scope, &ps, 0)
        };

        match check() {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::debug!(workflow = %workflow_name, error = %e, "Initialization check failed");
                false
            }
        }
    }

    /// Execute `action_id` on an active entry
    pub fn do_action(&self, entry_id: EntryId, action_id: i32, inputs: Inputs) -> WorkflowResult<()> {
        let result = self.do_action_at_depth(entry_id, action_id, inputs, 0);
        self.rollback_on(result)
    }

    fn do_action_at_depth(
        &self,
        entry_id: EntryId,
        action_id: i32,
        inputs: Inputs,
        depth: usize,
    ) -> WorkflowResult<()> {
        if depth > self.config.max_auto_chain_depth {
            return Err(WorkflowError::ChainLimitExceeded(self.config.max_auto_chain_depth));
        }

        let entry = self
            .store
            .find_entry(entry_id)?
            .ok_or(WorkflowError::EntryNotFound(entry_id))?;
        if !entry.is_active() {
            return Err(WorkflowError::InvalidAction(format!(
                "entry {} is {}, actions need an ACTIVATED entry",
                entry_id, entry.state
            )));
        }

        let descriptor = self.descriptors.get(&entry.workflow_name)?;
        let current = self.store.find_current_steps(entry_id)?;
        let ps = self.store.property_set(entry_id)?;
        let mut scope =
            self.build_scope(entry, Arc::clone(&descriptor), current.clone(), inputs.clone(), &ps)?;
        let machine = self.state_machine();
        let mut cache = AvailabilityCache::new();

        let action = find_valid_action(&machine, &mut cache, &descriptor, &current, action_id, &mut scope, &ps)?
            .ok_or_else(|| {
                WorkflowError::InvalidAction(format!(
                    "action {} is not available for entry {}",
                    action_id, entry_id
                ))
            })?;

        let outcome = machine.execute_action(&mut cache, action, &mut scope, &ps)?;
        self.after_transition(&machine, outcome, entry_id, action_id, inputs, depth)
    }

    /// Implicit finish, then auto-chaining of the first available auto
    /// action. The transient scope of the finished call is dropped; the
    /// lookup and the chained call start from the caller's `inputs`.
    fn after_transition(
        &self,
        machine: &StateMachine,
        outcome: TransitionOutcome,
        entry_id: EntryId,
        action_id: i32,
        inputs: Inputs,
        depth: usize,
    ) -> WorkflowResult<()> {
        if outcome == TransitionOutcome::Finished {
            return Ok(());
        }

        let entry = self
            .store
            .find_entry(entry_id)?
            .ok_or(WorkflowError::EntryNotFound(entry_id))?;
        if !entry.is_active() {
            return Ok(());
        }
        let descriptor = self.descriptors.get(&entry.workflow_name)?;
        let current = self.store.find_current_steps(entry_id)?;

        let nothing_left = current.iter().all(|step| {
            descriptor
                .get_step(step.step_def_id)
                .is_some_and(|def| !def.has_actions())
        });
        if self.config.implicit_finish && nothing_left {
            machine
                .lifecycle()
                .complete(entry_id, action_id, self.context.caller())?;
            tracing::info!(entry_id = %entry_id, action_id, "Entry finished, no actions left");
            return Ok(());
        }

        let ps = self.store.property_set(entry_id)?;
        let mut scope =
            self.build_scope(entry, Arc::clone(&descriptor), current.clone(), inputs.clone(), &ps)?;
        let mut cache = AvailabilityCache::new();
        if let Some(auto_id) =
            find_auto_action(machine, &mut cache, &descriptor, &current, &mut scope, &ps)?
        {
            tracing::debug!(
                entry_id = %entry_id,
                action_id = auto_id,
                depth = depth + 1,
                "Auto-executing action"
            );
            return self.do_action_at_depth(entry_id, auto_id, inputs, depth + 1);
        }
        Ok(())
    }

    /// Move an entry along a lifecycle edge. Requesting the current state
    /// is a no-op.
    pub fn change_entry_state(&self, entry_id: EntryId, state: EntryState) -> WorkflowResult<()> {
        let result = self
            .state_machine()
            .lifecycle()
            .change_state(entry_id, state, self.context.caller())
            .map(|_| ());
        self.rollback_on(result)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Ids of every action the caller may execute now, globals first
    pub fn get_available_actions(
        &self,
        entry_id: EntryId,
        inputs: Inputs,
    ) -> WorkflowResult<Vec<i32>> {
        let entry = match self.store.find_entry(entry_id) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Err(WorkflowError::EntryNotFound(entry_id)),
            Err(e) => {
                tracing::error!(entry_id = %entry_id, error = %e, "Failed to load entry");
                return Ok(Vec::new());
            }
        };
        if !entry.is_active() {
            return Ok(Vec::new());
        }

        match self.collect_available_actions(entry, inputs) {
            Ok(ids) => Ok(ids),
            Err(e) => {
                tracing::error!(entry_id = %entry_id, error = %e, "Failed to list available actions");
                Ok(Vec::new())
            }
        }
    }

    fn collect_available_actions(&self, entry: WorkflowEntry, inputs: Inputs) -> WorkflowResult<Vec<i32>> {
        let entry_id = entry.id;
        let descriptor = self.descriptors.get(&entry.workflow_name)?;
        let current = self.store.find_current_steps(entry_id)?;
        let ps = self.store.property_set(entry_id)?;
        let mut scope = self.build_scope(entry, Arc::clone(&descriptor), current.clone(), inputs, &ps)?;
        let machine = self.state_machine();
        let mut cache = AvailabilityCache::new();

        let mut ids = Vec::new();
        for action in descriptor.scoped_global_actions() {
            if machine.is_available(&mut cache, action, &mut scope, &ps, 0)? && !ids.contains(&action.id()) {
                ids.push(action.id());
            }
        }
        for step in &current {
            for action in descriptor.actions_for_step(step.step_def_id) {
                if machine.is_available(&mut cache, action, &mut scope, &ps, step.step_def_id)?
                    && !ids.contains(&action.id())
                {
                    ids.push(action.id());
                }
            }
        }
        Ok(ids)
    }

    pub fn get_current_steps(&self, entry_id: EntryId) -> Vec<Step> {
        self.store.find_current_steps(entry_id).unwrap_or_else(|e| {
            tracing::error!(entry_id = %entry_id, error = %e, "Failed to load current steps");
            Vec::new()
        })
    }

    pub fn get_history_steps(&self, entry_id: EntryId) -> Vec<Step> {
        self.store.find_history_steps(entry_id).unwrap_or_else(|e| {
            tracing::error!(entry_id = %entry_id, error = %e, "Failed to load history steps");
            Vec::new()
        })
    }

    pub fn get_property_set(&self, entry_id: EntryId) -> Option<PropertySet> {
        match self.store.property_set(entry_id) {
            Ok(ps) => Some(ps),
            Err(e) => {
                tracing::error!(entry_id = %entry_id, error = %e, "Failed to load property set");
                None
            }
        }
    }

    pub fn get_entry(&self, entry_id: EntryId) -> WorkflowResult<WorkflowEntry> {
        self.store
            .find_entry(entry_id)?
            .ok_or(WorkflowError::EntryNotFound(entry_id))
    }

    /// Lifecycle state, `Unknown` when the entry cannot be loaded
    pub fn get_entry_state(&self, entry_id: EntryId) -> EntryState {
        match self.store.find_entry(entry_id) {
            Ok(Some(entry)) => entry.state,
            Ok(None) => EntryState::Unknown,
            Err(e) => {
                tracing::error!(entry_id = %entry_id, error = %e, "Failed to load entry");
                EntryState::Unknown
            }
        }
    }

    pub fn query(&self, query: &StepQuery) -> WorkflowResult<Vec<EntryId>> {
        Ok(self.store.query(query)?)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn state_machine(&self) -> StateMachine {
        StateMachine::new(
            Arc::clone(&self.extensions),
            Arc::clone(&self.resolver),
            Arc::clone(&self.store),
            self.config.clone(),
        )
    }

    /// Scope seeded with inputs, then register values
    fn build_scope(
        &self,
        entry: WorkflowEntry,
        descriptor: Arc<WorkflowDescriptor>,
        current_steps: Vec<Step>,
        inputs: Inputs,
        ps: &PropertySet,
    ) -> WorkflowResult<TransientScope> {
        let mut scope = TransientScope::new(
            Arc::clone(&self.context),
            entry,
            Arc::clone(&descriptor),
            Arc::clone(&self.store),
            current_steps,
        )
        .with_inputs(inputs);

        for register in &descriptor.registers {
            let args = translate_args(self.resolver.as_ref(), &register.args, &scope, ps);
            let provider = self.extensions.resolve_register(&register.type_name, &args)?;
            let value = provider.register_variable(self.context.as_ref(), &scope.entry, &args, ps)?;
            scope.set(register.variable_name.clone(), value);
        }
        Ok(scope)
    }

    fn rollback_on<T>(&self, result: WorkflowResult<T>) -> WorkflowResult<T> {
        if let Err(e) = &result {
            if e.is_rollback_required() {
                self.signal_rollback(e);
            }
        }
        result
    }

    fn signal_rollback(&self, error: &WorkflowError) {
        tracing::error!(error = %error, "Marking unit of work for rollback");
        self.context.set_rollback_only();
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("descriptors", &self.descriptors.names())
            .field("extensions", &self.extensions)
            .field("caller", &self.context.caller())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The requested action if it is reachable and available: globals are
/// checked first, then the actions of each current step
fn find_valid_action<'d>(
    machine: &StateMachine,
    cache: &mut AvailabilityCache,
    descriptor: &'d WorkflowDescriptor,
    current: &[Step],
    action_id: i32,
    scope: &mut TransientScope,
    ps: &PropertySet,
) -> WorkflowResult<Option<ScopedAction<'d>>> {
    for action in descriptor.scoped_global_actions() {
        if action.id() == action_id && machine.is_available(cache, action, scope, ps, 0)? {
            return Ok(Some(action));
        }
    }
    for step in current {
        if let Some(action) = descriptor.action_for_step(step.step_def_id, action_id) {
            if machine.is_available(cache, action, scope, ps, step.step_def_id)? {
                return Ok(Some(action));
            }
        }
    }
    Ok(None)
}

/// First available auto-execute action, globals first
fn find_auto_action(
    machine: &StateMachine,
    cache: &mut AvailabilityCache,
    descriptor: &WorkflowDescriptor,
    current: &[Step],
    scope: &mut TransientScope,
    ps: &PropertySet,
) -> WorkflowResult<Option<i32>> {
    for action in descriptor.scoped_global_actions() {
        if action.action.auto_execute && machine.is_available(cache, action, scope, ps, 0)? {
            return Ok(Some(action.id()));
        }
    }
    for step in current {
        for action in descriptor.actions_for_step(step.step_def_id) {
            if action.action.auto_execute
                && machine.is_available(cache, action, scope, ps, step.step_def_id)?
            {
                return Ok(Some(action.id()));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_store::InMemoryWorkflowStore;
    use workflow_types::{
        ActionDescriptor, ConditionDescriptor, ConditionsDescriptor, ResultDescriptor,
        StepDescriptor,
    };

    fn make_orchestrator() -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(Arc::new(InMemoryWorkflowStore::new()))
            .with_context(Arc::new(BasicWorkflowContext::new("alice")))
    }

    fn make_simple_descriptor() -> WorkflowDescriptor {
        WorkflowDescriptor::new("review")
            .with_initial_action(
                ActionDescriptor::new(1, "Start")
                    .with_result(ResultDescriptor::to_step(1).with_status("Underway")),
            )
            .with_step(
                StepDescriptor::new(1, "Review").with_action(
                    ActionDescriptor::new(10, "Approve")
                        .with_result(ResultDescriptor::to_step(2).with_old_status("Approved")),
                ),
            )
            .with_step(StepDescriptor::new(2, "Done"))
    }

    #[test]
    fn test_register_and_initialize() {
        let mut orchestrator = make_orchestrator();
        orchestrator.register_descriptor(make_simple_descriptor()).unwrap();
        assert_eq!(orchestrator.get_workflow_names(), vec!["review".to_string()]);

        let id = orchestrator.initialize("review", 1, Inputs::new()).unwrap();
        assert_eq!(orchestrator.get_entry_state(id), EntryState::Activated);
        let current = orchestrator.get_current_steps(id);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].step_def_id, 1);
        assert_eq!(orchestrator.get_available_actions(id, Inputs::new()).unwrap(), vec![10]);
    }

    #[test]
    fn test_do_action_reaches_terminal_step() {
        let mut orchestrator = make_orchestrator();
        orchestrator.register_descriptor(make_simple_descriptor()).unwrap();
        let id = orchestrator.initialize("review", 1, Inputs::new()).unwrap();

        orchestrator.do_action(id, 10, Inputs::new()).unwrap();

        // step 2 has no actions: implicit finish
        assert_eq!(orchestrator.get_entry_state(id), EntryState::Completed);
        assert!(orchestrator.get_current_steps(id).is_empty());
        let history = orchestrator.get_history_steps(id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, "Approved");
        assert!(!orchestrator.context().is_rollback_only());
    }

    #[test]
    fn test_initialize_unknown_workflow() {
        let orchestrator = make_orchestrator();
        let result = orchestrator.initialize("missing", 1, Inputs::new());
        assert!(matches!(result, Err(WorkflowError::WorkflowNotFound(_))));
        assert!(!orchestrator.context().is_rollback_only());
    }

    #[test]
    fn test_initialize_with_non_initial_action() {
        let mut orchestrator = make_orchestrator();
        orchestrator.register_descriptor(make_simple_descriptor()).unwrap();
        let result = orchestrator.initialize("review", 10, Inputs::new());
        assert!(matches!(result, Err(WorkflowError::InvalidAction(_))));
    }

    #[test]
    fn test_unknown_action_is_invalid() {
        let mut orchestrator = make_orchestrator();
        orchestrator.register_descriptor(make_simple_descriptor()).unwrap();
        let id = orchestrator.initialize("review", 1, Inputs::new()).unwrap();

        let result = orchestrator.do_action(id, 99, Inputs::new());
        assert!(matches!(result, Err(WorkflowError::InvalidAction(_))));
        assert_eq!(orchestrator.get_current_steps(id).len(), 1);
        assert!(!orchestrator.context().is_rollback_only());
    }

    #[test]
    fn test_unknown_entry() {
        let orchestrator = make_orchestrator();
        assert!(matches!(
            orchestrator.do_action(EntryId(42), 1, Inputs::new()),
            Err(WorkflowError::EntryNotFound(EntryId(42)))
        ));
        assert!(matches!(
            orchestrator.get_available_actions(EntryId(42), Inputs::new()),
            Err(WorkflowError::EntryNotFound(_))
        ));
        assert_eq!(orchestrator.get_entry_state(EntryId(42)), EntryState::Unknown);
    }

    #[test]
    fn test_can_initialize_uses_restriction() {
        let mut orchestrator = make_orchestrator();
        let descriptor = WorkflowDescriptor::new("guarded")
            .with_initial_action(
                ActionDescriptor::new(1, "Start")
                    .with_restriction(ConditionsDescriptor::single(
                        ConditionDescriptor::new("caller").with_arg("caller", "alice"),
                    ))
                    .with_result(ResultDescriptor::to_step(1)),
            )
            .with_step(StepDescriptor::new(1, "Only"));
        orchestrator.register_descriptor(descriptor).unwrap();

        assert!(orchestrator.can_initialize("guarded", 1, Inputs::new()));
        let bob = orchestrator.as_caller(Arc::new(BasicWorkflowContext::new("bob")));
        assert!(!bob.can_initialize("guarded", 1, Inputs::new()));
        assert!(!orchestrator.can_initialize("guarded", 2, Inputs::new()));
        assert!(!orchestrator.can_initialize("missing", 1, Inputs::new()));
    }

    #[test]
    fn test_change_entry_state() {
        let mut orchestrator = make_orchestrator();
        orchestrator.register_descriptor(make_simple_descriptor()).unwrap();
        let id = orchestrator.initialize("review", 1, Inputs::new()).unwrap();

        orchestrator.change_entry_state(id, EntryState::Suspended).unwrap();
        assert_eq!(orchestrator.get_entry_state(id), EntryState::Suspended);
        assert!(orchestrator.get_available_actions(id, Inputs::new()).unwrap().is_empty());
        assert!(matches!(
            orchestrator.do_action(id, 10, Inputs::new()),
            Err(WorkflowError::InvalidAction(_))
        ));

        orchestrator.change_entry_state(id, EntryState::Activated).unwrap();
        orchestrator.change_entry_state(id, EntryState::Activated).unwrap();
        assert_eq!(orchestrator.get_entry_state(id), EntryState::Activated);

        let result = orchestrator.change_entry_state(id, EntryState::Created);
        assert!(matches!(result, Err(WorkflowError::InvalidEntryState { .. })));
        assert!(!orchestrator.context().is_rollback_only());
    }
}
