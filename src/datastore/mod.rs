// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address pool datastore
//!
//! In-process store for VLAN ranges, address records, rule rows and the
//! portable pool. Reads go through named queries returning owned records;
//! every write goes through a [`Transaction`], which holds row locks and
//! commits with a version check.
//!
//! # Named queries
//!
//! | Query | Returns |
//! |---|---|
//! | [`Datastore::find_free`] | first `Free` record matching a [`FreeAddressQuery`] |
//! | [`Datastore::list_by_network`] | records associated with a guest network |
//! | [`Datastore::vlans_dedicated_to_account`] / [`Datastore::vlans_dedicated_to_domain`] | dedicated VLAN ids in a zone |
//! | [`Datastore::shared_vlans`] | non-dedicated VLAN ids in a zone |
//! | [`Datastore::source_nat_for_network`] | the network's source-NAT record |
//! | [`Datastore::first_free_portable`] | first free region pool entry |

mod transaction;

pub use transaction::Transaction;

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{
    AccountId, AddressId, AddressRecord, AddressState, DomainId, IpVersion, NetworkId,
    PhysicalNetworkId, PodId, PortableIpId, PortableIpRecord, RuleId, RuleRecord, RuleState,
    VlanId, VlanRange, VlanUsage, ZoneId,
};
use crate::errors::{AddressError, AddressResult};
use crate::external::RuleStateQuery;
use crate::locks::LockManager;

/// Filter for [`Datastore::find_free`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeAddressQuery {
    pub zone_id: ZoneId,
    /// Candidate VLAN set; records outside it never match
    pub vlans: Vec<VlanId>,
    pub usage: VlanUsage,
    pub requested: Option<IpAddr>,
    pub pod_id: Option<PodId>,
    pub ip_version: Option<IpVersion>,
    /// Restrict to the VLANs of a direct-attached guest network
    pub network_id: Option<NetworkId>,
    pub for_system_vms: bool,
    /// Treat `for_system_vms` as a filter instead of a sort preference
    pub strict_system_vm_reservation: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) vlans: BTreeMap<VlanId, VlanRange>,
    pub(crate) addresses: BTreeMap<AddressId, AddressRecord>,
    pub(crate) by_ip: HashMap<(ZoneId, IpAddr), AddressId>,
    pub(crate) rules: BTreeMap<RuleId, RuleRecord>,
    pub(crate) portable: BTreeMap<PortableIpId, PortableIpRecord>,
}

/// Address pool store
pub struct Datastore {
    tables: RwLock<Tables>,
    locks: Arc<LockManager>,
    max_range_size: u128,
}

impl Datastore {
    pub fn new(max_range_size: u128) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            locks: Arc::new(LockManager::new()),
            max_range_size,
        }
    }

    /// Lock manager shared by every operation on this store
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Open a transaction; dropping it without committing rolls back
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    pub(crate) fn read(&self) -> AddressResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AddressError::InvariantViolation("datastore lock poisoned".into()))
    }

    pub(crate) fn write(&self) -> AddressResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AddressError::InvariantViolation("datastore lock poisoned".into()))
    }

    // ---- provisioning -------------------------------------------------------

    /// Register a VLAN range and expand it into `Free` address records
    pub fn provision_vlan(&self, vlan: VlanRange) -> AddressResult<Vec<AddressId>> {
        let range = vlan
            .range()
            .map_err(|e| AddressError::InvalidParameter(e.to_string()))?;
        if range.len() > self.max_range_size {
            return Err(AddressError::InvalidParameter(format!(
                "range {} holds {} addresses, limit is {}",
                range,
                range.len(),
                self.max_range_size
            )));
        }

        let mut tables = self.write()?;
        if tables.vlans.contains_key(&vlan.id) {
            return Err(AddressError::InvalidParameter(format!(
                "vlan {} already provisioned",
                vlan.id
            )));
        }
        if let Some(taken) = range
            .iter()
            .find(|ip| tables.by_ip.contains_key(&(vlan.zone_id, *ip)))
        {
            return Err(AddressError::InvalidParameter(format!(
                "address {} already exists in zone {}",
                taken, vlan.zone_id
            )));
        }

        let ids: Vec<AddressId> = range
            .iter()
            .map(|ip| {
                let record = AddressRecord::free(ip, vlan.id, vlan.zone_id);
                let id = record.id;
                tables.by_ip.insert((vlan.zone_id, ip), id);
                tables.addresses.insert(id, record);
                id
            })
            .collect();

        info!(vlan = %vlan.id, zone = %vlan.zone_id, range = %range, count = ids.len(), "provisioned vlan range");
        tables.vlans.insert(vlan.id, vlan);
        Ok(ids)
    }

    /// Reserve (or unreserve) an address for system VMs
    pub fn set_for_system_vms(&self, id: AddressId, reserved: bool) -> AddressResult<()> {
        let mut tables = self.write()?;
        let record = tables
            .addresses
            .get_mut(&id)
            .ok_or_else(|| AddressError::not_found("address", id))?;
        record.for_system_vms = reserved;
        record.version += 1;
        Ok(())
    }

    /// Add an entry to the region-wide portable pool
    pub fn provision_portable(&self, record: PortableIpRecord) -> AddressResult<PortableIpId> {
        let mut tables = self.write()?;
        if tables.portable.values().any(|p| p.address == record.address) {
            return Err(AddressError::InvalidParameter(format!(
                "portable address {} already exists",
                record.address
            )));
        }
        let id = record.id;
        tables.portable.insert(id, record);
        Ok(id)
    }

    // ---- rules --------------------------------------------------------------

    pub fn insert_rule(&self, rule: RuleRecord) -> AddressResult<RuleId> {
        let mut tables = self.write()?;
        let id = rule.id;
        debug!(rule = %id, purpose = %rule.purpose, state = ?rule.state, "rule inserted");
        tables.rules.insert(id, rule);
        Ok(id)
    }

    pub fn set_rule_state(&self, id: RuleId, state: RuleState) -> AddressResult<()> {
        let mut tables = self.write()?;
        let rule = tables
            .rules
            .get_mut(&id)
            .ok_or_else(|| AddressError::not_found("rule", id))?;
        rule.state = state;
        Ok(())
    }

    // ---- named queries ------------------------------------------------------

    pub fn vlan(&self, id: VlanId) -> AddressResult<VlanRange> {
        self.read()?
            .vlans
            .get(&id)
            .cloned()
            .ok_or_else(|| AddressError::not_found("vlan", id))
    }

    pub fn vlans_dedicated_to_account(
        &self,
        zone: ZoneId,
        account: AccountId,
    ) -> AddressResult<Vec<VlanId>> {
        Ok(self
            .read()?
            .vlans
            .values()
            .filter(|v| v.zone_id == zone && v.is_dedicated_to_account(account))
            .map(|v| v.id)
            .collect())
    }

    pub fn vlans_dedicated_to_domain(
        &self,
        zone: ZoneId,
        domain: DomainId,
    ) -> AddressResult<Vec<VlanId>> {
        Ok(self
            .read()?
            .vlans
            .values()
            .filter(|v| v.zone_id == zone && v.is_dedicated_to_domain(domain))
            .map(|v| v.id)
            .collect())
    }

    pub fn shared_vlans(&self, zone: ZoneId) -> AddressResult<Vec<VlanId>> {
        Ok(self
            .read()?
            .vlans
            .values()
            .filter(|v| v.zone_id == zone && !v.is_dedicated())
            .map(|v| v.id)
            .collect())
    }

    /// Whether the record's VLAN range is dedicated to an account or domain
    pub fn is_dedicated(&self, record: &AddressRecord) -> AddressResult<bool> {
        Ok(self
            .read()?
            .vlans
            .get(&record.vlan_id)
            .map(VlanRange::is_dedicated)
            .unwrap_or(false))
    }

    /// Usage of the record's VLAN range
    pub fn usage_of(&self, record: &AddressRecord) -> AddressResult<VlanUsage> {
        self.read()?
            .vlans
            .get(&record.vlan_id)
            .map(|v| v.usage)
            .ok_or_else(|| AddressError::not_found("vlan", record.vlan_id))
    }

    /// First `Free` record matching the query
    ///
    /// Portable records are never leased here; they belong to the region pool.
    ///
    /// Ordered by the system-VM preference (unless it is a hard filter), then
    /// VLAN id, then address.
    pub fn find_free(&self, query: &FreeAddressQuery) -> AddressResult<Option<AddressRecord>> {
        let tables = self.read()?;

        let mut matches: Vec<&AddressRecord> = tables
            .addresses
            .values()
            .filter(|r| r.state == AddressState::Free && r.zone_id == query.zone_id)
            .filter(|r| !r.portable)
            .filter(|r| query.vlans.contains(&r.vlan_id))
            .filter(|r| {
                tables.vlans.get(&r.vlan_id).is_some_and(|v| {
                    v.usage == query.usage
                        && query.pod_id.map_or(true, |pod| v.pod_id == Some(pod))
                        && query
                            .network_id
                            .map_or(true, |net| v.network_id == Some(net))
                })
            })
            .filter(|r| query.requested.map_or(true, |ip| r.address == ip))
            .filter(|r| query.ip_version.map_or(true, |v| r.ip_version() == v))
            .filter(|r| {
                !query.strict_system_vm_reservation || r.for_system_vms == query.for_system_vms
            })
            .collect();

        matches.sort_by_key(|r| (r.for_system_vms != query.for_system_vms, r.vlan_id, r.address));
        Ok(matches.first().map(|r| (*r).clone()))
    }

    pub fn address(&self, id: AddressId) -> AddressResult<AddressRecord> {
        self.read()?
            .addresses
            .get(&id)
            .cloned()
            .ok_or_else(|| AddressError::not_found("address", id))
    }

    pub fn find_by_ip(&self, zone: ZoneId, ip: IpAddr) -> AddressResult<Option<AddressRecord>> {
        let tables = self.read()?;
        Ok(tables
            .by_ip
            .get(&(zone, ip))
            .and_then(|id| tables.addresses.get(id))
            .cloned())
    }

    pub fn list_by_network(&self, network: NetworkId) -> AddressResult<Vec<AddressRecord>> {
        Ok(self
            .read()?
            .addresses
            .values()
            .filter(|r| r.associated_network == Some(network))
            .cloned()
            .collect())
    }

    pub fn list_by_owner(&self, account: AccountId) -> AddressResult<Vec<AddressRecord>> {
        Ok(self
            .read()?
            .addresses
            .values()
            .filter(|r| r.allocated_to_account == Some(account))
            .cloned()
            .collect())
    }

    pub fn source_nat_for_network(
        &self,
        network: NetworkId,
    ) -> AddressResult<Option<AddressRecord>> {
        Ok(self
            .read()?
            .addresses
            .values()
            .find(|r| r.source_nat && r.associated_network == Some(network))
            .cloned())
    }

    pub fn first_free_portable(&self) -> AddressResult<Option<PortableIpRecord>> {
        Ok(self
            .read()?
            .portable
            .values()
            .filter(|p| p.is_free())
            .min_by_key(|p| p.address)
            .cloned())
    }

    pub fn portable_by_ip(&self, ip: IpAddr) -> AddressResult<Option<PortableIpRecord>> {
        Ok(self
            .read()?
            .portable
            .values()
            .find(|p| p.address == ip)
            .cloned())
    }

    /// Physical network carrying the zone's shared public ranges
    pub fn public_physical_network(
        &self,
        zone: ZoneId,
    ) -> AddressResult<Option<PhysicalNetworkId>> {
        Ok(self
            .read()?
            .vlans
            .values()
            .find(|v| {
                v.zone_id == zone && v.usage == VlanUsage::VirtualNetwork && !v.is_dedicated()
            })
            .map(|v| v.physical_network_id))
    }

    /// VLAN in `zone` covering `ip`, if any
    pub fn vlan_covering(&self, zone: ZoneId, ip: IpAddr) -> AddressResult<Option<VlanRange>> {
        Ok(self
            .read()?
            .vlans
            .values()
            .filter(|v| v.zone_id == zone)
            .find(|v| v.range().is_ok_and(|r| r.contains(&ip)))
            .cloned())
    }
}

#[async_trait]
impl RuleStateQuery for Datastore {
    async fn rules_for_address(&self, address: AddressId) -> AddressResult<Vec<RuleRecord>> {
        Ok(self
            .read()?
            .rules
            .values()
            .filter(|r| r.source_address == Some(address))
            .cloned()
            .collect())
    }
}
