// Copyright (c) 2025 - Cowboy AI, Inc.

//! Collaborator implementations
//!
//! Concrete implementations of the traits in [`crate::external`]:
//!
//! - [`nats_usage`] - usage events published on NATS
//! - [`memory`] - in-process quota, directory and usage recorders for
//!   single-node deployments and tests

pub mod memory;
pub mod nats_usage;

pub use memory::{InMemoryResourceLimits, RecordingUsageSink, StaticDirectory};
pub use nats_usage::NatsUsageSink;
