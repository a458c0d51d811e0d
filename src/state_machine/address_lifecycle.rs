// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Lifecycle State Machine
//!
//! # States
//!
//! - Free: in the pool
//! - Allocating: leased, not yet pushed to a provider
//! - Allocated: live
//! - Releasing: withdrawn, waiting for providers to let go
//!
//! # Inputs
//!
//! - Allocate: Free → Allocating
//! - Promote: Allocating → Allocated (Free → Allocated is tolerated)
//! - BeginRelease: Allocating | Allocated → Releasing
//! - CompleteRelease: Releasing → Free
//! - ProviderDissociate: Allocated → Releasing (snapshot only)
//! - ProviderReassert: Releasing → Allocated (snapshot only)
//!
//! The two snapshot-only inputs model what the association engine decides for
//! a single reconcile call. They are never persisted; [`is_persistable`]
//! rejects the reverse edge they introduce.
//!
//! # Outputs
//!
//! A [`Bookkeeping`] hint: whether the transition charges or refunds the
//! owner's public-IP counter. Whether the charge actually applies also depends
//! on the owner, the range dedication and the network binding, which the
//! caller knows and the state machine does not.

use super::{StateMachine, TransitionError, TransitionResult};
use crate::domain::AddressState;

/// Lifecycle input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressInput {
    Allocate,
    Promote,
    BeginRelease,
    CompleteRelease,
    ProviderDissociate,
    ProviderReassert,
}

impl AddressInput {
    /// Inputs that may be persisted to the datastore
    pub const PERSISTED: [AddressInput; 4] = [
        AddressInput::Allocate,
        AddressInput::Promote,
        AddressInput::BeginRelease,
        AddressInput::CompleteRelease,
    ];
}

/// Counter bookkeeping implied by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bookkeeping {
    None,
    /// Address became live
    Charge,
    /// A live address was withdrawn
    Refund,
}

impl StateMachine for AddressState {
    type Input = AddressInput;
    type Output = Bookkeeping;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use AddressInput::*;
        use AddressState::*;

        match (self, input) {
            (Free, Allocate) => Ok((Allocating, Bookkeeping::None)),
            (Allocating, Promote) | (Free, Promote) => Ok((Allocated, Bookkeeping::Charge)),
            (Allocating, BeginRelease) => Ok((Releasing, Bookkeeping::None)),
            (Allocated, BeginRelease) => Ok((Releasing, Bookkeeping::Refund)),
            (Releasing, CompleteRelease) => Ok((Free, Bookkeeping::None)),

            (Allocated, ProviderDissociate) => Ok((Releasing, Bookkeeping::None)),
            (Releasing, ProviderReassert) => Ok((Allocated, Bookkeeping::None)),

            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                input: format!("{:?}", input),
            }),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use AddressInput::*;
        use AddressState::*;

        match self {
            Free => vec![Allocate, Promote],
            Allocating => vec![Promote, BeginRelease],
            Allocated => vec![BeginRelease, ProviderDissociate],
            Releasing => vec![CompleteRelease, ProviderReassert],
        }
    }
}

/// Position along the `Free → Allocating → Allocated → Releasing` cycle
pub fn cycle_position(state: AddressState) -> u8 {
    match state {
        AddressState::Free => 0,
        AddressState::Allocating => 1,
        AddressState::Allocated => 2,
        AddressState::Releasing => 3,
    }
}

/// Whether a stored record may move from `from` to `to`
///
/// Persisted changes follow exactly one persisted input. Staying put is
/// allowed for attribute-only updates.
pub fn is_persistable(from: AddressState, to: AddressState) -> bool {
    from == to
        || AddressInput::PERSISTED
            .iter()
            .any(|input| matches!(from.transition(input), Ok((next, _)) if next == to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(AddressState::Free, AddressInput::Allocate, AddressState::Allocating, Bookkeeping::None)]
    #[test_case(AddressState::Allocating, AddressInput::Promote, AddressState::Allocated, Bookkeeping::Charge)]
    #[test_case(AddressState::Free, AddressInput::Promote, AddressState::Allocated, Bookkeeping::Charge ; "defensive promote from free")]
    #[test_case(AddressState::Allocating, AddressInput::BeginRelease, AddressState::Releasing, Bookkeeping::None)]
    #[test_case(AddressState::Allocated, AddressInput::BeginRelease, AddressState::Releasing, Bookkeeping::Refund)]
    #[test_case(AddressState::Releasing, AddressInput::CompleteRelease, AddressState::Free, Bookkeeping::None)]
    fn test_legal_transitions(
        from: AddressState,
        input: AddressInput,
        to: AddressState,
        bookkeeping: Bookkeeping,
    ) {
        let (next, output) = from.transition(&input).unwrap();
        assert_eq!(next, to);
        assert_eq!(output, bookkeeping);
        assert!(is_persistable(from, next));
    }

    #[test_case(AddressState::Allocated, AddressInput::Promote ; "promote is not repeatable")]
    #[test_case(AddressState::Releasing, AddressInput::Promote ; "releasing cannot promote")]
    #[test_case(AddressState::Free, AddressInput::BeginRelease ; "free cannot release")]
    #[test_case(AddressState::Allocated, AddressInput::Allocate ; "double allocate")]
    #[test_case(AddressState::Allocating, AddressInput::CompleteRelease ; "skip releasing")]
    fn test_illegal_transitions(from: AddressState, input: AddressInput) {
        assert!(matches!(
            from.transition(&input),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_refusal_names_state_and_input() {
        let err = AddressState::Releasing
            .transition(&AddressInput::Promote)
            .unwrap_err();
        assert_eq!(err.to_string(), "Promote is not accepted while Releasing");
        assert!(!AddressState::Releasing.can_transition(&AddressInput::Promote));
    }

    #[test]
    fn test_snapshot_reassert_is_not_persistable() {
        let (next, _) = AddressState::Releasing
            .transition(&AddressInput::ProviderReassert)
            .unwrap();
        assert_eq!(next, AddressState::Allocated);
        assert!(!is_persistable(AddressState::Releasing, next));
    }

    #[test]
    fn test_valid_inputs_are_accepted() {
        for state in [
            AddressState::Free,
            AddressState::Allocating,
            AddressState::Allocated,
            AddressState::Releasing,
        ] {
            for input in state.valid_inputs() {
                assert!(state.can_transition(&input), "{state} rejects {input:?}");
            }
        }
    }
}
