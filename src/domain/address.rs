// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Records
//!
//! One [`AddressRecord`] exists per (zone, address). Records are expanded from
//! VLAN ranges at provisioning time and mutated in place across leases; only
//! the synthetic records backing portable addresses are ever deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::ids::{AccountId, AddressId, DomainId, NetworkId, VlanId, VmId, VpcId, ZoneId};
use super::vlan::IpVersion;

/// Allocation state of an address
///
/// Moves forward along `Free → Allocating → Allocated → Releasing → Free`.
/// See [`crate::state_machine::address_lifecycle`] for the legal inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressState {
    Free,
    Allocating,
    Allocated,
    Releasing,
}

impl fmt::Display for AddressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressState::Free => "Free",
            AddressState::Allocating => "Allocating",
            AddressState::Allocated => "Allocated",
            AddressState::Releasing => "Releasing",
        };
        write!(f, "{}", s)
    }
}

/// Leasable address row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: AddressId,
    pub address: IpAddr,
    pub vlan_id: VlanId,
    pub zone_id: ZoneId,
    pub state: AddressState,
    pub allocated_to_account: Option<AccountId>,
    pub allocated_in_domain: Option<DomainId>,
    pub associated_network: Option<NetworkId>,
    pub vpc_id: Option<VpcId>,
    /// Static NAT target
    pub associated_vm: Option<VmId>,
    pub source_nat: bool,
    pub one_to_one_nat: bool,
    pub system: bool,
    pub portable: bool,
    pub display: bool,
    pub for_system_vms: bool,
    pub allocated_at: Option<DateTime<Utc>>,
    /// Row version for conditional updates
    pub version: u64,
}

impl AddressRecord {
    /// Fresh `Free` record
    pub fn free(address: IpAddr, vlan_id: VlanId, zone_id: ZoneId) -> Self {
        Self {
            id: AddressId::new(),
            address,
            vlan_id,
            zone_id,
            state: AddressState::Free,
            allocated_to_account: None,
            allocated_in_domain: None,
            associated_network: None,
            vpc_id: None,
            associated_vm: None,
            source_nat: false,
            one_to_one_nat: false,
            system: false,
            portable: false,
            display: true,
            for_system_vms: false,
            allocated_at: None,
            version: 0,
        }
    }

    pub fn ip_version(&self) -> IpVersion {
        IpVersion::of(&self.address)
    }

    /// Bound to a guest network or a VPC
    pub fn is_associated(&self) -> bool {
        self.associated_network.is_some() || self.vpc_id.is_some()
    }

    /// Owner and allocation timestamp are both unset
    pub fn is_unowned(&self) -> bool {
        self.allocated_to_account.is_none() && self.allocated_at.is_none()
    }

    /// Clear every lease-scoped field, keeping identity and provisioning data
    pub fn clear_lease(&mut self) {
        self.allocated_to_account = None;
        self.allocated_in_domain = None;
        self.associated_network = None;
        self.vpc_id = None;
        self.associated_vm = None;
        self.source_nat = false;
        self.one_to_one_nat = false;
        self.system = false;
        self.display = true;
        self.allocated_at = None;
    }
}
