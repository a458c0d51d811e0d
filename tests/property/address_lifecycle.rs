// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Address Lifecycle
//!
//! Arbitrary input sequences are driven through the lifecycle machine. Inputs
//! the machine rejects are skipped, which is how the datastore treats them.

use proptest::prelude::*;

use cim_address_manager::domain::AddressState;
use cim_address_manager::state_machine::address_lifecycle::{
    cycle_position, is_persistable, AddressInput, Bookkeeping,
};
use cim_address_manager::state_machine::StateMachine;

// ============================================================================
// Strategies
// ============================================================================

fn persisted_input() -> impl Strategy<Value = AddressInput> {
    prop::sample::select(AddressInput::PERSISTED.to_vec())
}

fn any_input() -> impl Strategy<Value = AddressInput> {
    prop_oneof![
        4 => persisted_input(),
        1 => Just(AddressInput::ProviderDissociate),
        1 => Just(AddressInput::ProviderReassert),
    ]
}

fn any_state() -> impl Strategy<Value = AddressState> {
    prop::sample::select(vec![
        AddressState::Free,
        AddressState::Allocating,
        AddressState::Allocated,
        AddressState::Releasing,
    ])
}

/// One accepted step
#[derive(Debug, Clone, Copy)]
struct Step {
    from: AddressState,
    to: AddressState,
    input: AddressInput,
}

/// Applies accepted inputs from `Free`, skipping rejected ones
fn drive(inputs: &[AddressInput]) -> (AddressState, Vec<Step>) {
    let mut state = AddressState::Free;
    let mut steps = Vec::new();
    for input in inputs {
        if let Ok((to, _)) = state.transition(input) {
            steps.push(Step { from: state, to, input: *input });
            state = to;
        }
    }
    (state, steps)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: persisted transitions only move forward around the cycle
    ///
    /// Each accepted persisted input advances the cycle position by one, or
    /// by two for a promotion straight from `Free`.
    #[test]
    fn prop_persisted_transitions_are_monotonic(inputs in prop::collection::vec(persisted_input(), 0..60)) {
        let (_, steps) = drive(&inputs);

        for step in steps {
            let from = cycle_position(step.from);
            let to = cycle_position(step.to);
            let advance = (to + 4 - from) % 4;
            prop_assert!(
                advance == 1 || (advance == 2 && step.input == AddressInput::Promote),
                "{:?} -> {:?} on {:?}",
                step.from,
                step.to,
                step.input
            );
        }
    }

    /// Property: the counter is charged exactly while the address is `Allocated`
    #[test]
    fn prop_charge_balance_tracks_allocated(inputs in prop::collection::vec(persisted_input(), 0..60)) {
        let mut state = AddressState::Free;
        let mut balance = 0i64;

        for input in inputs {
            if let Ok((next, bookkeeping)) = state.transition(&input) {
                match bookkeeping {
                    Bookkeeping::Charge => balance += 1,
                    Bookkeeping::Refund => balance -= 1,
                    Bookkeeping::None => {}
                }
                state = next;
            }
            prop_assert_eq!(balance, i64::from(state == AddressState::Allocated));
        }
    }

    /// Property: every reachable state offers at least one way forward
    #[test]
    fn prop_reachable_states_are_never_stuck(inputs in prop::collection::vec(any_input(), 0..40)) {
        let (state, steps) = drive(&inputs);
        prop_assert!(!state.valid_inputs().is_empty());
        for pair in steps.windows(2) {
            prop_assert_eq!(pair[0].to, pair[1].from);
        }
    }

    /// Property: valid_inputs lists exactly the accepted inputs
    #[test]
    fn prop_valid_inputs_are_accepted(state in any_state(), input in any_input()) {
        prop_assert_eq!(
            state.valid_inputs().contains(&input),
            state.can_transition(&input)
        );
    }

    /// Property: provider snapshot moves are never persistable on their own
    /// unless a persisted input reaches the same state
    #[test]
    fn prop_provider_moves_are_not_persisted(state in any_state()) {
        for input in [AddressInput::ProviderDissociate, AddressInput::ProviderReassert] {
            if let Ok((next, bookkeeping)) = state.transition(&input) {
                prop_assert_eq!(bookkeeping, Bookkeeping::None);
                let persisted = AddressInput::PERSISTED
                    .iter()
                    .any(|p| matches!(state.transition(p), Ok((n, _)) if n == next));
                prop_assert_eq!(is_persistable(state, next), persisted);
            }
        }
    }
}
