//! Memoized action-availability checks
//!
//! An action is available when the workflow's global conditions and the
//! action's own restriction both pass. The same action is often checked
//! twice in one call (listing, then choosing the leaving step), so results
//! are cached per call chain. A cache must never outlive the call that
//! created it.

use crate::{ConditionEvaluator, TransientScope, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;
use workflow_store::PropertySet;
use workflow_types::{ActionKey, ScopedAction};

/// Availability results for one call chain
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    results: HashMap<ActionKey, bool>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ActionKey) -> Option<bool> {
        self.results.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Check whether `action` may fire, consulting and filling `cache`.
///
/// The scope's `action_id` is set to the checked action for the duration
/// of the evaluation and restored afterwards.
pub fn is_available(
    evaluator: &ConditionEvaluator,
    cache: &mut AvailabilityCache,
    action: ScopedAction<'_>,
    scope: &mut TransientScope,
    ps: &PropertySet,
    step_id: i32,
) -> WorkflowResult<bool> {
    let key = action.key();
    if let Some(cached) = cache.get(&key) {
        return Ok(cached);
    }

    let previous = scope.action_id.replace(action.id());
    let descriptor = Arc::clone(&scope.descriptor);
    let outcome = evaluator
        .evaluate(descriptor.global_conditions.as_ref(), scope, ps, step_id)
        .and_then(|global| {
            if global {
                evaluator.evaluate(action.action.restriction.as_ref(), scope, ps, step_id)
            } else {
                Ok(false)
            }
        });
    scope.action_id = previous;

    let available = outcome?;
    cache.results.insert(key, available);
    tracing::trace!(action_id = action.id(), step_id, available, "Action availability");
    Ok(available)
}
