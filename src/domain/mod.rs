// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Management Domain Models
//!
//! Value objects and records the address manager works on.
//!
//! # Records
//!
//! - [`VlanRange`] - provisioned address range, zone/pod/tenant scoped
//! - [`AddressRecord`] - one leasable address and its allocation state
//! - [`RuleRecord`] - firewall / NAT / LB / VPN rule evidence
//! - [`PortableIpRecord`] - region-wide portable pool entry
//!
//! # Catalog metadata
//!
//! - [`Network`], [`Account`], [`Actor`]
//!
//! # Identifiers
//!
//! Every entity is keyed by a UUID v7 newtype (see [`ids`]).

pub mod address;
pub mod ids;
pub mod network;
pub mod portable;
pub mod rules;
pub mod vlan;

pub use address::{AddressRecord, AddressState};
pub use ids::{
    AccountId, AddressId, DomainId, NetworkId, PhysicalNetworkId, PodId, PortableIpId, RuleId,
    UserId, VlanId, VmId, VpcId, ZoneId,
};
pub use network::{Account, AccountKind, Actor, GuestType, Network, NetworkState};
pub use portable::{PortableIpRecord, PortableIpState};
pub use rules::{Provider, RulePurpose, RuleRecord, RuleState, Service, StaticNatRule, TrafficType};
pub use vlan::{Dedication, IpRange, IpRangeError, IpVersion, VlanRange, VlanUsage};
