//! Engine error taxonomy

use crate::extension::ExtensionKind;
use std::collections::BTreeMap;
use workflow_store::StoreError;
use workflow_types::{DescriptorError, EntryId, EntryState};

/// Errors raised by the workflow engine
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        /// Per-field rejection reasons, keyed by input name
        field_errors: BTreeMap<String, String>,
    },

    #[error("Entry {entry_id} cannot move from {from} to {to}")]
    InvalidEntryState {
        entry_id: EntryId,
        from: EntryState,
        to: EntryState,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Extension not found: no {kind} registered as '{type_name}'")]
    ExtensionNotFound {
        kind: ExtensionKind,
        type_name: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(i32),

    #[error("Auto-chain limit of {0} actions exceeded")]
    ChainLimitExceeded(usize),

    #[error("Extension failed: {0}")]
    Extension(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Validator rejection without per-field detail
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Whether the ambient unit of work must be marked failed.
    ///
    /// Only rejections raised before any mutation are exempt.
    pub fn is_rollback_required(&self) -> bool {
        !matches!(
            self,
            Self::InvalidAction(_)
                | Self::InvalidEntryState { .. }
                | Self::EntryNotFound(_)
                | Self::WorkflowNotFound(_)
        )
    }

    /// Whether the caller asked for something the engine refuses,
    /// as opposed to a configuration or backend failure
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAction(_)
                | Self::InvalidInput { .. }
                | Self::InvalidEntryState { .. }
                | Self::Unauthorized(_)
                | Self::EntryNotFound(_)
                | Self::WorkflowNotFound(_)
        )
    }
}

/// Result type alias for engine operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_classification() {
        assert!(!WorkflowError::InvalidAction("x".into()).is_rollback_required());
        assert!(!WorkflowError::EntryNotFound(EntryId(1)).is_rollback_required());
        assert!(WorkflowError::invalid_input("bad").is_rollback_required());
        assert!(WorkflowError::Configuration("x".into()).is_rollback_required());
        assert!(WorkflowError::Store(StoreError::Backend("down".into())).is_rollback_required());
    }

    #[test]
    fn test_caller_errors() {
        assert!(WorkflowError::Unauthorized("x".into()).is_caller_error());
        assert!(WorkflowError::invalid_input("bad").is_caller_error());
        assert!(!WorkflowError::ChainLimitExceeded(3).is_caller_error());
        assert!(!WorkflowError::Descriptor(DescriptorError::MissingName).is_caller_error());
    }

    #[test]
    fn test_messages() {
        let err = WorkflowError::InvalidEntryState {
            entry_id: EntryId(4),
            from: EntryState::Completed,
            to: EntryState::Activated,
        };
        assert_eq!(err.to_string(), "Entry 4 cannot move from COMPLETED to ACTIVATED");

        let err = WorkflowError::ExtensionNotFound {
            kind: ExtensionKind::Condition,
            type_name: "beanshell".into(),
        };
        assert_eq!(
            err.to_string(),
            "Extension not found: no condition registered as 'beanshell'"
        );
    }
}
