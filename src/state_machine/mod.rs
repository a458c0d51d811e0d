// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle state machines
//!
//! Transitions are pure: `(State, Input) → (State, Output)`. The output names
//! the bookkeeping a transition implies and the caller performs it inside the
//! same transaction that persists the new state.
//!
//! ```rust
//! use cim_address_manager::domain::AddressState;
//! use cim_address_manager::state_machine::StateMachine;
//! use cim_address_manager::state_machine::address_lifecycle::AddressInput;
//!
//! let (next, _) = AddressState::Free.transition(&AddressInput::Allocate).unwrap();
//! assert_eq!(next, AddressState::Allocating);
//! ```

pub mod address_lifecycle;

pub type TransitionResult<S> = Result<S, TransitionError>;

/// A state refused an input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{input} is not accepted while {from}")]
    InvalidTransition { from: String, input: String },
}

/// A record lifecycle driven by typed inputs
pub trait StateMachine: Sized + Clone {
    type Input;

    /// Bookkeeping the caller owes for an accepted transition
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Inputs accepted from this state, when the machine can enumerate them
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        Vec::new()
    }
}
