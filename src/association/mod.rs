// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service association
//!
//! - [`engine`] - pure classification of addresses into active services
//! - [`provider`] - static provider bindings and per-provider batching
//! - [`protocol`] - when to reconcile providers around rule programming
//!
//! An address moves through association driven only by rule observation:
//!
//! ```text
//! Allocating ──first rule──> Allocated (associated)
//!            ──last rule revoked──> Releasing (dissociated) ──release──> Free
//! ```

pub mod engine;
pub mod protocol;
pub mod provider;

pub use engine::{
    classify, needs_association, needs_static_nat_association, Classification, RuleEvidence,
    ServiceBinding,
};
pub use protocol::AssociationProtocol;
pub use provider::{
    group_by_provider, ElementRegistry, ProviderAssignment, ProviderBindingTable,
    ProviderBindingTableBuilder,
};
