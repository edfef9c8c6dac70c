//! Built-in guards, functions, validators and registers
//!
//! | Kind | Type name | Args |
//! |------|-----------|------|
//! | condition | `always`, `never` | none |
//! | condition | `status` | `stepId`, `status` |
//! | condition | `caller` | `caller` |
//! | condition | `allow-owner-only` | `stepId` |
//! | condition | `join-status` | `stepId`, `status` |
//! | condition | `input` | `name`, `value` |
//! | function | `set-caller` | none |
//! | function | `set-property` | `name`, `value` |
//! | function | `most-recent-owner` | `stepId` |
//! | validator | `required-inputs` | `names` (comma separated) |
//! | register | `property` | `name` |
//!
//! A `stepId` of 0 or absent matches any step.

use crate::{
    Condition, ExtensionRegistry, FunctionProvider, Register, TransientScope, Validator,
    WorkflowContext, WorkflowError, WorkflowResult,
};
use serde_json::Value;
use std::collections::BTreeMap;
use workflow_store::PropertySet;
use workflow_types::{Args, Step, WorkflowEntry};

pub(crate) fn register_builtins(registry: &mut ExtensionRegistry) {
    registry.register_condition("always", ConstantCondition(true));
    registry.register_condition("never", ConstantCondition(false));
    registry.register_condition("status", StatusCondition);
    registry.register_condition("caller", CallerCondition);
    registry.register_condition("allow-owner-only", AllowOwnerOnlyCondition);
    registry.register_condition("join-status", JoinStatusCondition);
    registry.register_condition("input", InputCondition);
    registry.register_function("set-caller", SetCallerFunction);
    registry.register_function("set-property", SetPropertyFunction);
    registry.register_function("most-recent-owner", MostRecentOwnerFunction);
    registry.register_validator("required-inputs", RequiredInputsValidator);
    registry.register_register("property", PropertyRegister);
}

fn required_arg<'a>(args: &'a Args, name: &str, type_name: &str) -> WorkflowResult<&'a str> {
    args.get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            WorkflowError::Configuration(format!("{} requires argument '{}'", type_name, name))
        })
}

/// `stepId` argument, 0 when absent
fn step_id_arg(args: &Args, type_name: &str) -> WorkflowResult<i32> {
    match args.get("stepId").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(raw) => raw.parse::<i32>().map_err(|_| {
            WorkflowError::Configuration(format!("{}: stepId '{}' is not a number", type_name, raw))
        }),
    }
}

fn matching_steps(steps: &[Step], step_id: i32) -> impl Iterator<Item = &Step> {
    steps
        .iter()
        .filter(move |s| step_id == 0 || s.step_def_id == step_id)
}

fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

// ── Conditions ───────────────────────────────────────────────────────

/// `always` / `never`
pub struct ConstantCondition(pub bool);

impl Condition for ConstantCondition {
    fn passes(&self, _: &TransientScope, _: &Args, _: &PropertySet) -> WorkflowResult<bool> {
        Ok(self.0)
    }
}

/// A current step has the given status
pub struct StatusCondition;

impl Condition for StatusCondition {
    fn passes(&self, scope: &TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<bool> {
        let status = required_arg(args, "status", "status")?;
        let step_id = step_id_arg(args, "status")?;
        Ok(matching_steps(&scope.current_steps, step_id).any(|s| s.status == status))
    }
}

/// The caller is the named user
pub struct CallerCondition;

impl Condition for CallerCondition {
    fn passes(&self, scope: &TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<bool> {
        let expected = required_arg(args, "caller", "caller")?;
        Ok(scope.caller() == Some(expected))
    }
}

/// The caller owns a matching current step
pub struct AllowOwnerOnlyCondition;

impl Condition for AllowOwnerOnlyCondition {
    fn passes(&self, scope: &TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<bool> {
        let Some(caller) = scope.caller() else {
            return Ok(false);
        };
        let step_id = step_id_arg(args, "allow-owner-only")?;
        Ok(matching_steps(&scope.current_steps, step_id)
            .any(|s| s.owner.as_deref() == Some(caller)))
    }
}

/// A join branch arrived with the given status. Outside of joins it
/// never passes.
pub struct JoinStatusCondition;

impl Condition for JoinStatusCondition {
    fn passes(&self, scope: &TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<bool> {
        let status = required_arg(args, "status", "join-status")?;
        let step_id = step_id_arg(args, "join-status")?;
        let Some(nodes) = scope.join_nodes.as_ref() else {
            return Ok(false);
        };
        if step_id == 0 {
            return Ok(nodes.steps().iter().any(|s| s.status == status));
        }
        Ok(nodes.step(step_id).is_some_and(|s| s.status == status))
    }
}

/// A scope variable equals a value
pub struct InputCondition;

impl Condition for InputCondition {
    fn passes(&self, scope: &TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<bool> {
        let name = required_arg(args, "name", "input")?;
        let expected = args.get("value").map(String::as_str).unwrap_or_default();
        Ok(scope
            .lookup(name)
            .is_some_and(|v| value_matches(&v, expected)))
    }
}

// ── Functions ────────────────────────────────────────────────────────

/// Copies the caller into the `caller` variable
pub struct SetCallerFunction;

impl FunctionProvider for SetCallerFunction {
    fn execute(&self, scope: &mut TransientScope, _: &Args, _: &PropertySet) -> WorkflowResult<()> {
        let caller = scope.caller().map(Value::from).unwrap_or(Value::Null);
        scope.set("caller", caller);
        Ok(())
    }
}

/// Writes a property of the entry
pub struct SetPropertyFunction;

impl FunctionProvider for SetPropertyFunction {
    fn execute(&self, _: &mut TransientScope, args: &Args, ps: &PropertySet) -> WorkflowResult<()> {
        let name = required_arg(args, "name", "set-property")?;
        let value = args.get("value").cloned().unwrap_or_default();
        ps.set(name, value);
        Ok(())
    }
}

/// Puts the owner of the latest history step of a definition into
/// `mostRecentOwner`
pub struct MostRecentOwnerFunction;

impl FunctionProvider for MostRecentOwnerFunction {
    fn execute(&self, scope: &mut TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<()> {
        let step_id = step_id_arg(args, "most-recent-owner")?;
        let history = scope.store.find_history_steps(scope.entry.id)?;
        let owner = history
            .iter()
            .rev()
            .filter(|s| step_id == 0 || s.step_def_id == step_id)
            .find_map(|s| s.owner.clone());
        if let Some(owner) = owner {
            scope.set("mostRecentOwner", owner);
        }
        Ok(())
    }
}

// ── Validators ───────────────────────────────────────────────────────

/// Every listed input must be present and non-null
pub struct RequiredInputsValidator;

impl Validator for RequiredInputsValidator {
    fn validate(&self, scope: &TransientScope, args: &Args, _: &PropertySet) -> WorkflowResult<()> {
        let names = required_arg(args, "names", "required-inputs")?;
        let field_errors: BTreeMap<String, String> = names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .filter(|n| matches!(scope.lookup(n), None | Some(Value::Null)))
            .map(|n| (n.to_string(), "required".to_string()))
            .collect();

        if field_errors.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::InvalidInput {
                message: format!("missing required inputs: {}", field_errors.len()),
                field_errors,
            })
        }
    }
}

// ── Registers ────────────────────────────────────────────────────────

/// Exposes one property value
pub struct PropertyRegister;

impl Register for PropertyRegister {
    fn register_variable(
        &self,
        _: &dyn WorkflowContext,
        _: &WorkflowEntry,
        args: &Args,
        ps: &PropertySet,
    ) -> WorkflowResult<Value> {
        let name = required_arg(args, "name", "property")?;
        Ok(ps.get(name).unwrap_or(Value::Null))
    }
}
