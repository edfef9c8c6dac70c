//! Caller identity and the rollback signal

use std::sync::atomic::{AtomicBool, Ordering};

/// The engine's only coupling to its surroundings: who is calling, and a
/// way to mark the ambient unit of work as failed.
pub trait WorkflowContext: Send + Sync {
    fn caller(&self) -> Option<&str>;

    /// Mark the surrounding transaction as failed
    fn set_rollback_only(&self);

    fn is_rollback_only(&self) -> bool;
}

/// Context backed by a fixed caller and an in-process flag
#[derive(Debug, Default)]
pub struct BasicWorkflowContext {
    caller: Option<String>,
    rollback_only: AtomicBool,
}

impl BasicWorkflowContext {
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            caller: Some(caller.into()),
            rollback_only: AtomicBool::new(false),
        }
    }

    /// Context without a caller identity
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl WorkflowContext for BasicWorkflowContext {
    fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_flag() {
        let ctx = BasicWorkflowContext::new("alice");
        assert_eq!(ctx.caller(), Some("alice"));
        assert!(!ctx.is_rollback_only());
        ctx.set_rollback_only();
        assert!(ctx.is_rollback_only());
        assert_eq!(BasicWorkflowContext::anonymous().caller(), None);
    }
}
