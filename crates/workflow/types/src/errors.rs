//! Error types for descriptor construction and validation

/// Structural problems found in a workflow descriptor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("Duplicate action ID: {0}")]
    DuplicateActionId(i32),

    #[error("Duplicate step ID: {0}")]
    DuplicateStepId(i32),

    #[error("Duplicate split ID: {0}")]
    DuplicateSplitId(i32),

    #[error("Duplicate join ID: {0}")]
    DuplicateJoinId(i32),

    #[error("Step not found: {0}")]
    StepNotFound(i32),

    #[error("Split not found: {0}")]
    SplitNotFound(i32),

    #[error("Join not found: {0}")]
    JoinNotFound(i32),

    #[error("Common action not found: {0}")]
    CommonActionNotFound(i32),

    #[error("Action {0} has no unconditional result")]
    MissingUnconditionalResult(i32),

    #[error("Join {0} has no result")]
    MissingJoinResult(i32),

    #[error("Split {0} has no results")]
    EmptySplit(i32),

    #[error("Split {split} result must target a step, found {target}")]
    SplitResultNotStep { split: i32, target: String },

    #[error("Workflow '{0}' declares no initial action")]
    NoInitialAction(String),

    #[error("Workflow descriptor has no name")]
    MissingName,
}

/// Result type alias for descriptor operations
pub type DescriptorResult<T> = Result<T, DescriptorError>;
