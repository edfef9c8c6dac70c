//! Descriptor registry: stores and retrieves workflow descriptors by name
//!
//! Descriptors are validated on registration and immutable afterwards.
//! Registering a name again replaces the earlier descriptor; entries
//! created from the old one keep running against whatever the registry
//! holds when their next call arrives.

use crate::{WorkflowError, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;
use workflow_types::WorkflowDescriptor;

/// Registry of workflow descriptors
#[derive(Clone, Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<WorkflowDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a descriptor under its name
    pub fn register(&mut self, descriptor: WorkflowDescriptor) -> WorkflowResult<Arc<WorkflowDescriptor>> {
        descriptor.validate()?;

        let name = descriptor.name.clone();
        let descriptor = Arc::new(descriptor);
        let replaced = self
            .descriptors
            .insert(name.clone(), Arc::clone(&descriptor))
            .is_some();

        tracing::info!(
            workflow = %name,
            steps = descriptor.step_count(),
            replaced,
            "Workflow descriptor registered"
        );
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> WorkflowResult<Arc<WorkflowDescriptor>> {
        self.descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn remove(&mut self, name: &str) -> WorkflowResult<Arc<WorkflowDescriptor>> {
        let descriptor = self
            .descriptors
            .remove(name)
            .ok_or_else(|| WorkflowError::WorkflowNotFound(name.to_string()))?;
        tracing::info!(workflow = %name, "Workflow descriptor removed");
        Ok(descriptor)
    }
}
