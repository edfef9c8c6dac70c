//! Condition evaluator: decides condition trees
//!
//! The evaluator itself has no side effects, but the guards it invokes
//! are extensions and may fail. A failure to resolve or run a guard is
//! an error, never a silent `false`.

use crate::resolver::translate_args;
use crate::{ExtensionRegistry, TransientScope, VariableResolver, WorkflowResult};
use std::sync::Arc;
use workflow_store::PropertySet;
use workflow_types::{Combinator, ConditionDescriptor, ConditionNode, ConditionsDescriptor};

/// Argument that receives the evaluating step's definition id
const STEP_ID_ARG: &str = "stepId";
/// Placeholder value of [`STEP_ID_ARG`] meaning "the current step"
const CURRENT_STEP_PLACEHOLDER: &str = "-1";

/// Evaluates AND/OR condition trees against a scope
#[derive(Clone)]
pub struct ConditionEvaluator {
    registry: Arc<ExtensionRegistry>,
    resolver: Arc<dyn VariableResolver>,
}

impl ConditionEvaluator {
    pub fn new(registry: Arc<ExtensionRegistry>, resolver: Arc<dyn VariableResolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn resolver(&self) -> &dyn VariableResolver {
        self.resolver.as_ref()
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Evaluate a tree. A missing or empty tree passes.
    ///
    /// `current_step_id` replaces a `stepId` argument of `-1`; pass `-1`
    /// when there is no step context.
    pub fn evaluate(
        &self,
        conditions: Option<&ConditionsDescriptor>,
        scope: &TransientScope,
        ps: &PropertySet,
        current_step_id: i32,
    ) -> WorkflowResult<bool> {
        match conditions {
            None => Ok(true),
            Some(tree) => self.evaluate_tree(tree, scope, ps, current_step_id),
        }
    }

    fn evaluate_tree(
        &self,
        tree: &ConditionsDescriptor,
        scope: &TransientScope,
        ps: &PropertySet,
        current_step_id: i32,
    ) -> WorkflowResult<bool> {
        if tree.is_empty() {
            return Ok(true);
        }

        for node in &tree.conditions {
            let passed = match node {
                ConditionNode::Leaf(leaf) => self.evaluate_leaf(leaf, scope, ps, current_step_id)?,
                ConditionNode::Nested(nested) => {
                    self.evaluate_tree(nested, scope, ps, current_step_id)?
                }
            };

            match (tree.combinator, passed) {
                (Combinator::And, false) => return Ok(false),
                (Combinator::Or, true) => return Ok(true),
                _ => {}
            }
        }

        // AND saw no failure; OR saw no success
        Ok(tree.combinator == Combinator::And)
    }

    fn evaluate_leaf(
        &self,
        leaf: &ConditionDescriptor,
        scope: &TransientScope,
        ps: &PropertySet,
        current_step_id: i32,
    ) -> WorkflowResult<bool> {
        let mut args = translate_args(self.resolver.as_ref(), &leaf.args, scope, ps);
        if current_step_id != -1 {
            if let Some(step_id) = args.get_mut(STEP_ID_ARG) {
                if step_id.trim() == CURRENT_STEP_PLACEHOLDER {
                    *step_id = current_step_id.to_string();
                }
            }
        }

        let guard = self.registry.resolve_condition(&leaf.type_name, &args)?;
        let passed = guard.passes(scope, &args, ps)? != leaf.negate;

        tracing::trace!(
            guard = %leaf.type_name,
            negate = leaf.negate,
            passed,
            "Guard evaluated"
        );
        Ok(passed)
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::test_support::make_scope;
    use crate::{DefaultVariableResolver, WorkflowError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn evaluator_with(registry: ExtensionRegistry) -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(registry), Arc::new(DefaultVariableResolver))
    }

    fn leaf(type_name: &str) -> ConditionDescriptor {
        ConditionDescriptor::new(type_name)
    }

    #[test]
    fn test_empty_tree_passes() {
        let evaluator = evaluator_with(ExtensionRegistry::new());
        let scope = make_scope(None, vec![]);
        let ps = PropertySet::new();
        assert!(evaluator.evaluate(None, &scope, &ps, -1).unwrap());
        assert!(evaluator
            .evaluate(Some(&ConditionsDescriptor::or()), &scope, &ps, -1)
            .unwrap());
    }

    #[test]
    fn test_and_or_negate() {
        let evaluator = evaluator_with(ExtensionRegistry::with_builtins());
        let scope = make_scope(None, vec![]);
        let ps = PropertySet::new();

        let and = ConditionsDescriptor::and()
            .with_condition(leaf("always"))
            .with_condition(leaf("never"));
        assert!(!evaluator.evaluate(Some(&and), &scope, &ps, -1).unwrap());

        let or = ConditionsDescriptor::or()
            .with_condition(leaf("never"))
            .with_condition(leaf("always"));
        assert!(evaluator.evaluate(Some(&or), &scope, &ps, -1).unwrap());

        let negated = ConditionsDescriptor::single(leaf("never").negated());
        assert!(evaluator.evaluate(Some(&negated), &scope, &ps, -1).unwrap());

        let nested = ConditionsDescriptor::and()
            .with_condition(leaf("always"))
            .with_nested(ConditionsDescriptor::or().with_condition(leaf("never")));
        assert!(!evaluator.evaluate(Some(&nested), &scope, &ps, -1).unwrap());
    }

    #[test]
    fn test_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ExtensionRegistry::with_builtins();
        let counter = Arc::clone(&calls);
        registry.register_condition_fn("counted", move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        let evaluator = evaluator_with(registry);
        let scope = make_scope(None, vec![]);
        let ps = PropertySet::new();

        let and = ConditionsDescriptor::and()
            .with_condition(leaf("never"))
            .with_condition(leaf("counted"));
        assert!(!evaluator.evaluate(Some(&and), &scope, &ps, -1).unwrap());

        let or = ConditionsDescriptor::or()
            .with_condition(leaf("always"))
            .with_condition(leaf("counted"));
        assert!(evaluator.evaluate(Some(&or), &scope, &ps, -1).unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_step_id_placeholder() {
        let mut registry = ExtensionRegistry::new();
        registry.register_condition_fn("step-is-seven", |_, args, _| {
            Ok(args.get("stepId").map(String::as_str) == Some("7"))
        });
        let evaluator = evaluator_with(registry);
        let scope = make_scope(None, vec![]);
        let ps = PropertySet::new();

        let placeholder =
            ConditionsDescriptor::single(leaf("step-is-seven").with_arg("stepId", "-1"));
        assert!(evaluator.evaluate(Some(&placeholder), &scope, &ps, 7).unwrap());
        // no step context: placeholder left alone
        assert!(!evaluator.evaluate(Some(&placeholder), &scope, &ps, -1).unwrap());

        let explicit = ConditionsDescriptor::single(leaf("step-is-seven").with_arg("stepId", "3"));
        assert!(!evaluator.evaluate(Some(&explicit), &scope, &ps, 7).unwrap());
    }

    #[test]
    fn test_args_are_interpolated() {
        let evaluator = evaluator_with(ExtensionRegistry::with_builtins());
        let mut scope = make_scope(Some("dana"), vec![]);
        scope.set("approver", "dana");
        let ps = PropertySet::new();
        let tree = ConditionsDescriptor::single(leaf("caller").with_arg("caller", "${approver}"));
        assert!(evaluator.evaluate(Some(&tree), &scope, &ps, -1).unwrap());
    }

    #[test]
    fn test_unknown_guard_is_an_error() {
        let evaluator = evaluator_with(ExtensionRegistry::new());
        let scope = make_scope(None, vec![]);
        let ps = PropertySet::new();
        let tree = ConditionsDescriptor::single(leaf("beanshell"));
        let result = evaluator.evaluate(Some(&tree), &scope, &ps, -1);
        assert!(matches!(result, Err(WorkflowError::ExtensionNotFound { .. })));
    }
}
