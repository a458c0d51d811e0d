// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Manager Events
//!
//! Events are immutable facts about what happened to an address. They are
//! produced as data by the lease and release paths and handed to an
//! [`EffectExecutor`](crate::effects::EffectExecutor) once the transaction
//! that caused them has committed.
//!
//! # Module Organization
//!
//! - [`usage`] - assign / release / transfer usage facts

pub mod usage;

pub use usage::{UsageEvent, UsageEventKind};
