// Copyright (c) 2025 - Cowboy AI, Inc.
//! IP address management for the Composable Information Machine
//!
//! Leases public and direct-attached addresses out of provisioned VLAN
//! ranges, drives each address through its allocation lifecycle, and keeps
//! network service providers told which addresses they carry and for which
//! services. Usage events are published on NATS.

pub mod adapters;
pub mod association;
pub mod config;
pub mod datastore;
pub mod domain;
pub mod effects;
pub mod errors;
pub mod events;
pub mod external;
pub mod locks;
pub mod nats;
pub mod service;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use config::AddressManagerConfig;
pub use datastore::{Datastore, FreeAddressQuery, Transaction};
pub use errors::{AddressError, AddressResult, CapacityScope};
pub use events::{UsageEvent, UsageEventKind};
pub use nats::{NatsClient, NatsConfig};
pub use service::{AddressManager, AddressManagerBuilder, AddressService, LeaseRequest};
