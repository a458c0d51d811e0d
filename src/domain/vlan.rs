// Copyright (c) 2025 - Cowboy AI, Inc.
//! VLAN Ranges and Address Ranges
//!
//! A [`VlanRange`] is a provisioned, contiguous block of addresses bound to a
//! zone (and optionally a pod, a guest network, and one account or domain).
//! Provisioning happens outside this crate; the address manager only reads
//! ranges and the records expanded from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

use super::ids::{AccountId, DomainId, NetworkId, PhysicalNetworkId, PodId, VlanId, ZoneId};

/// Address range validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpRangeError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Range endpoints use different IP versions: {0}")]
    MixedVersions(String),

    #[error("Range start is after range end: {0}")]
    Inverted(String),
}

/// IP version filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Version of the given address
    pub fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

/// Inclusive range of addresses of one IP version
///
/// Parsed from the textual form used by VLAN provisioning:
/// `"10.1.1.10-10.1.1.20"` or a single address `"10.1.1.10"`.
///
/// # Examples
///
/// ```rust
/// use cim_address_manager::domain::IpRange;
///
/// let range: IpRange = "10.1.1.10-10.1.1.12".parse().unwrap();
/// assert_eq!(range.len(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    first: IpAddr,
    last: IpAddr,
}

impl IpRange {
    /// Create a range from its endpoints
    pub fn new(first: IpAddr, last: IpAddr) -> Result<Self, IpRangeError> {
        if IpVersion::of(&first) != IpVersion::of(&last) {
            return Err(IpRangeError::MixedVersions(format!("{}-{}", first, last)));
        }
        if to_u128(first) > to_u128(last) {
            return Err(IpRangeError::Inverted(format!("{}-{}", first, last)));
        }
        Ok(Self { first, last })
    }

    /// First address
    pub fn first(&self) -> IpAddr {
        self.first
    }

    /// Last address
    pub fn last(&self) -> IpAddr {
        self.last
    }

    /// IP version of both endpoints
    pub fn version(&self) -> IpVersion {
        IpVersion::of(&self.first)
    }

    /// Number of addresses, saturating at `u128::MAX`
    pub fn len(&self) -> u128 {
        (to_u128(self.last) - to_u128(self.first)).saturating_add(1)
    }

    /// A range always holds at least one address
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `address` falls inside the range
    pub fn contains(&self, address: &IpAddr) -> bool {
        IpVersion::of(address) == self.version()
            && (to_u128(self.first)..=to_u128(self.last)).contains(&to_u128(*address))
    }

    /// Iterate every address in the range in ascending order
    pub fn iter(&self) -> impl Iterator<Item = IpAddr> {
        let version = self.version();
        (to_u128(self.first)..=to_u128(self.last)).map(move |n| from_u128(version, n))
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            IpAddr::from_str(part.trim())
                .map_err(|_| IpRangeError::InvalidIpAddress(part.trim().to_string()))
        };

        match s.split_once('-') {
            Some((first, last)) => IpRange::new(parse(first)?, parse(last)?),
            None => {
                let single = parse(s)?;
                IpRange::new(single, single)
            }
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

fn to_u128(address: IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_u128(version: IpVersion, n: u128) -> IpAddr {
    match version {
        IpVersion::V4 => IpAddr::V4(Ipv4Addr::from(n as u32)),
        IpVersion::V6 => IpAddr::V6(Ipv6Addr::from(n)),
    }
}

/// How addresses of a VLAN range are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VlanUsage {
    /// Public addresses NATed in front of guest networks
    VirtualNetwork,
    /// Addresses handed directly to guest NICs on a shared network
    DirectAttached,
}

impl fmt::Display for VlanUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VlanUsage::VirtualNetwork => write!(f, "VirtualNetwork"),
            VlanUsage::DirectAttached => write!(f, "DirectAttached"),
        }
    }
}

/// Dedication of a VLAN range to a single tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Dedication {
    Account(AccountId),
    Domain(DomainId),
}

/// Provisioned VLAN address range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanRange {
    pub id: VlanId,
    pub usage: VlanUsage,
    /// Textual range as provisioned, e.g. `"203.0.113.10-203.0.113.20"`
    pub ip_range: String,
    /// Guest network owning the range (direct-attached ranges)
    pub network_id: Option<NetworkId>,
    pub physical_network_id: PhysicalNetworkId,
    pub zone_id: ZoneId,
    pub pod_id: Option<PodId>,
    pub dedication: Option<Dedication>,
}

impl VlanRange {
    /// Parse the textual range
    pub fn range(&self) -> Result<IpRange, IpRangeError> {
        self.ip_range.parse()
    }

    /// Whether the range is dedicated to an account or a domain
    pub fn is_dedicated(&self) -> bool {
        self.dedication.is_some()
    }

    /// Whether the range is dedicated to exactly this account
    pub fn is_dedicated_to_account(&self, account: AccountId) -> bool {
        matches!(self.dedication, Some(Dedication::Account(a)) if a == account)
    }

    /// Whether the range is dedicated to exactly this domain
    pub fn is_dedicated_to_domain(&self, domain: DomainId) -> bool {
        matches!(self.dedication, Some(Dedication::Domain(d)) if d == domain)
    }
}
