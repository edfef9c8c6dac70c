//! Extension points and their registry
//!
//! Descriptors reference guards, validators, functions and registers by
//! type name. The [`ExtensionRegistry`] maps each type name to a factory
//! that builds the implementation from the (already interpolated) args.
//! Registration happens once, at configuration time.

use crate::{TransientScope, WorkflowContext, WorkflowError, WorkflowResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use workflow_store::PropertySet;
use workflow_types::{Args, WorkflowEntry};

// ── Capability Traits ────────────────────────────────────────────────

/// A leaf guard of a condition tree
pub trait Condition: Send + Sync {
    fn passes(&self, scope: &TransientScope, args: &Args, ps: &PropertySet)
        -> WorkflowResult<bool>;
}

/// An input check. Rejections are reported as [`WorkflowError::InvalidInput`].
pub trait Validator: Send + Sync {
    fn validate(&self, scope: &TransientScope, args: &Args, ps: &PropertySet)
        -> WorkflowResult<()>;
}

/// A side-effecting hook. May write to the scope and the property set.
pub trait FunctionProvider: Send + Sync {
    fn execute(
        &self,
        scope: &mut TransientScope,
        args: &Args,
        ps: &PropertySet,
    ) -> WorkflowResult<()>;
}

/// Computes a value placed into every scope of a workflow
pub trait Register: Send + Sync {
    fn register_variable(
        &self,
        context: &dyn WorkflowContext,
        entry: &WorkflowEntry,
        args: &Args,
        ps: &PropertySet,
    ) -> WorkflowResult<Value>;
}

/// The four kinds of extension a descriptor can reference
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Condition,
    Validator,
    Function,
    Register,
}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Condition => write!(f, "condition"),
            Self::Validator => write!(f, "validator"),
            Self::Function => write!(f, "function"),
            Self::Register => write!(f, "register"),
        }
    }
}

// ── Closure Adapters ─────────────────────────────────────────────────

struct FnCondition<F>(F);

impl<F> Condition for FnCondition<F>
where
    F: Fn(&TransientScope, &Args, &PropertySet) -> WorkflowResult<bool> + Send + Sync,
{
    fn passes(&self, scope: &TransientScope, args: &Args, ps: &PropertySet) -> WorkflowResult<bool> {
        (self.0)(scope, args, ps)
    }
}

struct FnFunction<F>(F);

impl<F> FunctionProvider for FnFunction<F>
where
    F: Fn(&mut TransientScope, &Args, &PropertySet) -> WorkflowResult<()> + Send + Sync,
{
    fn execute(
        &self,
        scope: &mut TransientScope,
        args: &Args,
        ps: &PropertySet,
    ) -> WorkflowResult<()> {
        (self.0)(scope, args, ps)
    }
}

struct FnValidator<F>(F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(&TransientScope, &Args, &PropertySet) -> WorkflowResult<()> + Send + Sync,
{
    fn validate(&self, scope: &TransientScope, args: &Args, ps: &PropertySet) -> WorkflowResult<()> {
        (self.0)(scope, args, ps)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

type ConditionFactory = Arc<dyn Fn(&Args) -> WorkflowResult<Arc<dyn Condition>> + Send + Sync>;
type ValidatorFactory = Arc<dyn Fn(&Args) -> WorkflowResult<Arc<dyn Validator>> + Send + Sync>;
type FunctionFactory =
    Arc<dyn Fn(&Args) -> WorkflowResult<Arc<dyn FunctionProvider>> + Send + Sync>;
type RegisterFactory = Arc<dyn Fn(&Args) -> WorkflowResult<Arc<dyn Register>> + Send + Sync>;

/// Type name → factory maps for every extension kind
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    conditions: HashMap<String, ConditionFactory>,
    validators: HashMap<String, ValidatorFactory>,
    functions: HashMap<String, FunctionFactory>,
    registers: HashMap<String, RegisterFactory>,
}

impl ExtensionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in extensions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry);
        registry
    }

    // Shared instances

    pub fn register_condition<C: Condition + 'static>(
        &mut self,
        type_name: impl Into<String>,
        condition: C,
    ) {
        let shared: Arc<dyn Condition> = Arc::new(condition);
        self.register_condition_factory(type_name, move |_| Ok(Arc::clone(&shared)));
    }

    pub fn register_validator<V: Validator + 'static>(
        &mut self,
        type_name: impl Into<String>,
        validator: V,
    ) {
        let shared: Arc<dyn Validator> = Arc::new(validator);
        self.register_validator_factory(type_name, move |_| Ok(Arc::clone(&shared)));
    }

    pub fn register_function<P: FunctionProvider + 'static>(
        &mut self,
        type_name: impl Into<String>,
        function: P,
    ) {
        let shared: Arc<dyn FunctionProvider> = Arc::new(function);
        self.register_function_factory(type_name, move |_| Ok(Arc::clone(&shared)));
    }

    pub fn register_register<R: Register + 'static>(
        &mut self,
        type_name: impl Into<String>,
        register: R,
    ) {
        let shared: Arc<dyn Register> = Arc::new(register);
        self.register_register_factory(type_name, move |_| Ok(Arc::clone(&shared)));
    }

    // Closures

    pub fn register_condition_fn<F>(&mut self, type_name: impl Into<String>, f: F)
    where
        F: Fn(&TransientScope, &Args, &PropertySet) -> WorkflowResult<bool> + Send + Sync + 'static,
    {
        self.register_condition(type_name, FnCondition(f));
    }

    pub fn register_validator_fn<F>(&mut self, type_name: impl Into<String>, f: F)
    where
        F: Fn(&TransientScope, &Args, &PropertySet) -> WorkflowResult<()> + Send + Sync + 'static,
    {
        self.register_validator(type_name, FnValidator(f));
    }

    pub fn register_function_fn<F>(&mut self, type_name: impl Into<String>, f: F)
    where
        F: Fn(&mut TransientScope, &Args, &PropertySet) -> WorkflowResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.register_function(type_name, FnFunction(f));
    }

    // Factories

    pub fn register_condition_factory<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Args) -> WorkflowResult<Arc<dyn Condition>> + Send + Sync + 'static,
    {
        self.conditions.insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_validator_factory<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Args) -> WorkflowResult<Arc<dyn Validator>> + Send + Sync + 'static,
    {
        self.validators.insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_function_factory<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Args) -> WorkflowResult<Arc<dyn FunctionProvider>> + Send + Sync + 'static,
    {
        self.functions.insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_register_factory<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Args) -> WorkflowResult<Arc<dyn Register>> + Send + Sync + 'static,
    {
        self.registers.insert(type_name.into(), Arc::new(factory));
    }

    // ── Resolution ───────────────────────────────────────────────────

    pub fn resolve_condition(&self, type_name: &str, args: &Args) -> WorkflowResult<Arc<dyn Condition>> {
        let factory = self
            .conditions
            .get(type_name)
            .ok_or_else(|| not_found(ExtensionKind::Condition, type_name))?;
        factory(args)
    }

    pub fn resolve_validator(&self, type_name: &str, args: &Args) -> WorkflowResult<Arc<dyn Validator>> {
        let factory = self
            .validators
            .get(type_name)
            .ok_or_else(|| not_found(ExtensionKind::Validator, type_name))?;
        factory(args)
    }

    pub fn resolve_function(
        &self,
        type_name: &str,
        args: &Args,
    ) -> WorkflowResult<Arc<dyn FunctionProvider>> {
        let factory = self
            .functions
            .get(type_name)
            .ok_or_else(|| not_found(ExtensionKind::Function, type_name))?;
        factory(args)
    }

    pub fn resolve_register(&self, type_name: &str, args: &Args) -> WorkflowResult<Arc<dyn Register>> {
        let factory = self
            .registers
            .get(type_name)
            .ok_or_else(|| not_found(ExtensionKind::Register, type_name))?;
        factory(args)
    }

    pub fn contains(&self, kind: ExtensionKind, type_name: &str) -> bool {
        match kind {
            ExtensionKind::Condition => self.conditions.contains_key(type_name),
            ExtensionKind::Validator => self.validators.contains_key(type_name),
            ExtensionKind::Function => self.functions.contains_key(type_name),
            ExtensionKind::Register => self.registers.contains_key(type_name),
        }
    }
}

fn not_found(kind: ExtensionKind, type_name: &str) -> WorkflowError {
    WorkflowError::ExtensionNotFound {
        kind,
        type_name: type_name.to_string(),
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("conditions", &sorted_names(self.conditions.keys()))
            .field("validators", &sorted_names(self.validators.keys()))
            .field("functions", &sorted_names(self.functions.keys()))
            .field("registers", &sorted_names(self.registers.keys()))
            .finish()
    }
}

fn sorted_names<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
    let mut names: Vec<&str> = keys.map(String::as_str).collect();
    names.sort_unstable();
    names
}
