// Copyright (c) 2025 - Cowboy AI, Inc.
//! Region-wide portable addresses
//!
//! A portable address lives in a region pool and can follow its owner across
//! zones. While allocated it is backed by a synthetic [`AddressRecord`] in the
//! zone it is currently used in.
//!
//! [`AddressRecord`]: super::AddressRecord

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::ids::{AccountId, DomainId, PortableIpId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortableIpState {
    Free,
    Allocated,
}

/// Region pool entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableIpRecord {
    pub id: PortableIpId,
    pub address: IpAddr,
    pub gateway: IpAddr,
    pub netmask: String,
    pub vlan_tag: Option<String>,
    pub state: PortableIpState,
    pub allocated_to_account: Option<AccountId>,
    pub allocated_in_domain: Option<DomainId>,
    pub allocated_at: Option<DateTime<Utc>>,
}

impl PortableIpRecord {
    pub fn free(address: IpAddr, gateway: IpAddr, netmask: impl Into<String>) -> Self {
        Self {
            id: PortableIpId::new(),
            address,
            gateway,
            netmask: netmask.into(),
            vlan_tag: None,
            state: PortableIpState::Free,
            allocated_to_account: None,
            allocated_in_domain: None,
            allocated_at: None,
        }
    }

    pub fn with_vlan_tag(mut self, tag: impl Into<String>) -> Self {
        self.vlan_tag = Some(tag.into());
        self
    }

    pub fn is_free(&self) -> bool {
        self.state == PortableIpState::Free
    }

    /// Hand the entry to an owner
    pub fn allocate(&mut self, account: AccountId, domain: DomainId) {
        self.state = PortableIpState::Allocated;
        self.allocated_to_account = Some(account);
        self.allocated_in_domain = Some(domain);
        self.allocated_at = Some(Utc::now());
    }

    /// Return the entry to the region pool
    pub fn release(&mut self) {
        self.state = PortableIpState::Free;
        self.allocated_to_account = None;
        self.allocated_in_domain = None;
        self.allocated_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_then_release() {
        let mut entry = PortableIpRecord::free(
            "192.0.2.10".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
            "255.255.255.0",
        )
        .with_vlan_tag("vlan://100");

        let account = AccountId::new();
        entry.allocate(account, DomainId::new());
        assert!(!entry.is_free());
        assert_eq!(entry.allocated_to_account, Some(account));
        assert!(entry.allocated_at.is_some());

        entry.release();
        assert!(entry.is_free());
        assert_eq!(entry.allocated_to_account, None);
        assert_eq!(entry.vlan_tag.as_deref(), Some("vlan://100"));
    }
}
