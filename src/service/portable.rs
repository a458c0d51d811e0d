// Copyright (c) 2025 - Cowboy AI, Inc.
//! Portable addresses
//!
//! All three operations run under the `PortablePublicIpRange` global lock.
//! An allocated portable address is backed by a synthetic `Allocated`
//! [`AddressRecord`] in the zone where it is used, inside a single-address
//! VLAN range on the zone's public physical network.

use std::net::IpAddr;

use chrono::Utc;
use tracing::{info, warn};

use super::AddressManager;
use crate::domain::{
    AccountId, AddressId, AddressRecord, AddressState, NetworkId, VlanId, VlanRange, VlanUsage,
    VpcId, ZoneId,
};
use crate::effects::PendingEffect;
use crate::errors::{AddressError, AddressResult, CapacityScope};
use crate::events::{UsageEvent, UsageEventKind};
use crate::locks::PORTABLE_IP_LOCK;

fn require_portable(record: &AddressRecord) -> AddressResult<()> {
    if record.portable {
        Ok(())
    } else {
        Err(AddressError::InvalidParameter(format!(
            "address {} is not portable",
            record.address
        )))
    }
}

impl AddressManager {
    /// VLAN backing a portable address in `zone`; `true` when it must be created
    fn portable_vlan(&self, zone: ZoneId, ip: IpAddr) -> AddressResult<(VlanRange, bool)> {
        if let Some(vlan) = self.store.vlan_covering(zone, ip)? {
            return Ok((vlan, false));
        }
        let physical_network_id = self.store.public_physical_network(zone)?.ok_or_else(|| {
            AddressError::InvalidParameter(format!("zone {} has no public network", zone))
        })?;
        Ok((
            VlanRange {
                id: VlanId::new(),
                usage: VlanUsage::VirtualNetwork,
                ip_range: ip.to_string(),
                network_id: None,
                physical_network_id,
                zone_id: zone,
                pod_id: None,
                dedication: None,
            },
            true,
        ))
    }

    pub(super) async fn allocate_portable_ip_inner(
        &self,
        owner: AccountId,
        zone: ZoneId,
        network: Option<NetworkId>,
        vpc: Option<VpcId>,
    ) -> AddressResult<AddressRecord> {
        let owner = self.accounts.account(owner).await?;
        let network = match network {
            Some(id) => Some(self.networks.network(id).await?),
            None => None,
        };
        if let Some(network) = &network {
            if network.zone_id != zone {
                return Err(AddressError::InvalidParameter(format!(
                    "network {} is not in zone {}",
                    network.id, zone
                )));
            }
        }

        let _pool = self
            .store
            .locks()
            .lock_global(PORTABLE_IP_LOCK, self.config.portable_lock_wait)
            .await?;

        let mut entry =
            self.store
                .first_free_portable()?
                .ok_or_else(|| AddressError::InsufficientCapacity {
                    scope: CapacityScope::Region,
                    detail: "portable address pool exhausted".into(),
                })?;
        let (vlan, created) = self.portable_vlan(zone, entry.address)?;

        let mut record = AddressRecord::free(entry.address, vlan.id, zone);
        record.state = AddressState::Allocated;
        record.portable = true;
        record.allocated_to_account = Some(owner.id);
        record.allocated_in_domain = Some(owner.domain_id);
        record.allocated_at = Some(Utc::now());
        record.associated_network = network.as_ref().map(|n| n.id);
        record.vpc_id = vpc.or_else(|| network.as_ref().and_then(|n| n.vpc_id));

        entry.allocate(owner.id, owner.domain_id);

        let mut tx = self.store.transaction();
        if created {
            tx.insert_vlan(vlan);
        }
        tx.update_portable(entry);
        tx.insert(record.clone());
        if !owner.is_system() {
            if record.is_associated() {
                tx.defer(PendingEffect::ChargePublicIp(owner.id));
            }
            tx.defer(PendingEffect::Usage(UsageEvent::for_record(
                UsageEventKind::PortableIpAssign,
                owner.id,
                &record,
                VlanUsage::VirtualNetwork,
            )));
        }
        let effects = tx.commit()?;
        self.effects.execute(effects).await;

        info!(address = %record.address, zone = %zone, owner = %owner.id, "portable address allocated");
        self.store.address(record.id)
    }

    pub(super) async fn release_portable_ip_inner(&self, address: AddressId) -> AddressResult<()> {
        let _pool = self
            .store
            .locks()
            .lock_global(PORTABLE_IP_LOCK, self.config.portable_lock_wait)
            .await?;

        let mut tx = self.store.transaction();
        let record = tx.lock_address(address, self.config.lock_wait).await?;
        require_portable(&record)?;
        if matches!(
            record.state,
            AddressState::Allocating | AddressState::Allocated
        ) {
            return Err(AddressError::InvalidParameter(format!(
                "portable address {} is still {}",
                record.address, record.state
            )));
        }

        // releasing records go straight from the zone back to the region pool
        let mut entry = self
            .store
            .portable_by_ip(record.address)?
            .ok_or_else(|| AddressError::not_found("portable address", record.address))?;
        entry.release();

        tx.update_portable(entry);
        tx.delete(&record)?;
        tx.commit()?;

        info!(address = %record.address, "portable address returned to the region pool");
        Ok(())
    }

    pub(super) async fn transfer_portable_ip_inner(
        &self,
        address: AddressId,
        target_network: NetworkId,
    ) -> AddressResult<AddressRecord> {
        let target = self.networks.network(target_network).await?;

        let pool = self
            .store
            .locks()
            .lock_global(PORTABLE_IP_LOCK, self.config.portable_lock_wait)
            .await?;

        let mut tx = self.store.transaction();
        let record = tx.lock_address(address, self.config.lock_wait).await?;
        require_portable(&record)?;
        if record.state != AddressState::Allocated {
            return Err(AddressError::InvalidParameter(format!(
                "portable address {} is {}",
                record.address, record.state
            )));
        }
        let owner_id = record.allocated_to_account.ok_or_else(|| {
            AddressError::InvariantViolation(format!(
                "allocated portable address {} has no owner",
                record.address
            ))
        })?;
        if target.account_id != owner_id {
            return Err(AddressError::InvalidParameter(format!(
                "network {} belongs to another account",
                target.id
            )));
        }
        if record.associated_network == Some(target.id) {
            return Ok(record);
        }

        let mut moved = record.clone();
        moved.associated_network = Some(target.id);
        moved.vpc_id = target.vpc_id;

        if record.zone_id == target.zone_id {
            tx.update(moved.clone())?;
        } else {
            let (vlan, created) = self.portable_vlan(target.zone_id, record.address)?;
            moved.zone_id = target.zone_id;
            moved.vlan_id = vlan.id;
            moved.version = record.version + 1;
            if created {
                tx.insert_vlan(vlan);
            }
            tx.delete(&record)?;
            tx.insert(moved.clone());
        }

        let owner = self.accounts.account(owner_id).await?;
        if !owner.is_system() {
            tx.defer(PendingEffect::Usage(
                UsageEvent::for_record(
                    UsageEventKind::PortableIpTransfer,
                    owner_id,
                    &moved,
                    VlanUsage::VirtualNetwork,
                )
                .with_target_network(target.id),
            ));
        }
        let effects = tx.commit()?;
        self.effects.execute(effects).await;
        drop(pool);

        info!(
            address = %record.address,
            from = ?record.associated_network,
            to = %target.id,
            "portable address transferred"
        );

        if target.is_implemented() {
            if let Err(e) = self.apply_ip_associations(&target, false).await {
                warn!(network = %target.id, error = %e, "failed to settle transferred address");
                return Err(e);
            }
        }
        self.store.address(address)
    }
}
