//! Property tests: entry states only move along lifecycle edges.

mod common;

use common::*;
use proptest::prelude::*;
use workflow_engine::{Inputs, WorkflowError};
use workflow_types::EntryState;

fn arb_state() -> impl Strategy<Value = EntryState> {
    prop_oneof![
        Just(EntryState::Created),
        Just(EntryState::Activated),
        Just(EntryState::Suspended),
        Just(EntryState::Killed),
        Just(EntryState::Completed),
        Just(EntryState::Unknown),
    ]
}

proptest! {
    #[test]
    fn prop_state_follows_lifecycle_edges(requests in prop::collection::vec(arb_state(), 1..24)) {
        let mut orchestrator = orchestrator_as("alice");
        orchestrator.register_descriptor(approval()).unwrap();
        let id = orchestrator.initialize("approval", 1, Inputs::new()).unwrap();

        for target in requests {
            let before = orchestrator.get_entry_state(id);
            let result = orchestrator.change_entry_state(id, target);
            let after = orchestrator.get_entry_state(id);

            if before == target {
                prop_assert!(result.is_ok());
                prop_assert_eq!(after, before);
            } else if before.can_transition_to(target) {
                prop_assert!(result.is_ok());
                prop_assert_eq!(after, target);
            } else {
                let rejected = matches!(result, Err(WorkflowError::InvalidEntryState { .. }));
                prop_assert!(rejected);
                prop_assert_eq!(after, before);
            }

            prop_assert_ne!(after, EntryState::Unknown);
            if after.is_terminal() {
                prop_assert!(orchestrator.get_current_steps(id).is_empty());
            }
        }
    }
}
