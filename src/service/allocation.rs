// Copyright (c) 2025 - Cowboy AI, Inc.
//! Leasing
//!
//! Every entry point funnels into [`AddressManager::lease`]:
//!
//! 1. resolve candidate VLANs (dedicated first, shared otherwise)
//! 2. find one `Free` record, falling back to the shared pool once
//! 3. check quota unless leasing from a dedicated range
//! 4. row-lock, re-read, stamp the lease and move to `Allocating`
//! 5. optionally promote inside the same transaction
//! 6. commit, run effects, seed system firewall rules

use std::net::IpAddr;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::AddressManager;
use crate::datastore::{FreeAddressQuery, Transaction};
use crate::domain::{
    Account, AccountId, AddressId, AddressRecord, AddressState, IpVersion, Network, NetworkId,
    PodId, VlanId, VlanUsage, VpcId, ZoneId,
};
use crate::effects::PendingEffect;
use crate::errors::{AddressError, AddressResult};
use crate::events::{UsageEvent, UsageEventKind};
use crate::state_machine::address_lifecycle::{AddressInput, Bookkeeping};
use crate::state_machine::StateMachine;

/// Parameters of one lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRequest {
    pub zone_id: ZoneId,
    pub pod_id: Option<PodId>,
    /// Restrict candidates to these VLANs
    pub vlan_filter: Option<Vec<VlanId>>,
    pub owner: AccountId,
    pub usage: VlanUsage,
    pub guest_network: Option<NetworkId>,
    pub source_nat: bool,
    pub auto_promote: bool,
    pub requested_address: Option<IpAddr>,
    pub system: bool,
    pub vpc_id: Option<VpcId>,
    pub display: Option<bool>,
    pub for_system_vms: bool,
    pub ip_version: Option<IpVersion>,
}

impl LeaseRequest {
    pub fn new(zone_id: ZoneId, owner: AccountId, usage: VlanUsage) -> Self {
        Self {
            zone_id,
            pod_id: None,
            vlan_filter: None,
            owner,
            usage,
            guest_network: None,
            source_nat: false,
            auto_promote: false,
            requested_address: None,
            system: false,
            vpc_id: None,
            display: None,
            for_system_vms: false,
            ip_version: None,
        }
    }

    pub fn in_pod(mut self, pod: PodId) -> Self {
        self.pod_id = Some(pod);
        self
    }

    pub fn in_vlans(mut self, vlans: Vec<VlanId>) -> Self {
        self.vlan_filter = Some(vlans);
        self
    }

    pub fn for_network(mut self, network: NetworkId) -> Self {
        self.guest_network = Some(network);
        self
    }

    pub fn in_vpc(mut self, vpc: Option<VpcId>) -> Self {
        self.vpc_id = vpc;
        self
    }

    pub fn source_nat(mut self) -> Self {
        self.source_nat = true;
        self
    }

    pub fn auto_promote(mut self) -> Self {
        self.auto_promote = true;
        self
    }

    pub fn requesting(mut self, address: IpAddr) -> Self {
        self.requested_address = Some(address);
        self
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn display(mut self, display: bool) -> Self {
        self.display = Some(display);
        self
    }

    pub fn for_system_vms(mut self) -> Self {
        self.for_system_vms = true;
        self
    }

    pub fn ip_version(mut self, version: IpVersion) -> Self {
        self.ip_version = Some(version);
        self
    }

    fn filtered(&self, vlans: Vec<VlanId>) -> Vec<VlanId> {
        match &self.vlan_filter {
            Some(filter) => vlans.into_iter().filter(|v| filter.contains(v)).collect(),
            None => vlans,
        }
    }
}

impl AddressManager {
    /// Lease one address
    ///
    /// Callers serialize per owner through the account lock; `lease` itself
    /// only takes the promotion mutex (when promoting) and the row lock.
    pub async fn lease(&self, request: LeaseRequest) -> AddressResult<AddressRecord> {
        if let (Some(ip), Some(version)) = (request.requested_address, request.ip_version) {
            if IpVersion::of(&ip) != version {
                return Err(AddressError::InvalidParameter(format!(
                    "requested address {} is not {:?}",
                    ip, version
                )));
            }
        }

        let owner = self.accounts.account(request.owner).await?;
        let guest_network = match request.guest_network {
            Some(id) => Some(self.networks.network(id).await?),
            None => None,
        };

        let (candidate, dedicated) = self.find_candidate(&request, &owner, guest_network.as_ref())?;
        debug!(zone = %request.zone_id, owner = %owner.id, address = %candidate.address, dedicated, "lease candidate");

        if !dedicated && !owner.is_system() {
            self.limits.check_limit(&owner).await?;
        }

        let promotion = if request.auto_promote {
            Some(self.promotion.lock().await)
        } else {
            None
        };

        let mut tx = self.store.transaction();
        let mut record = tx.lock_address(candidate.id, self.config.lock_wait).await?;
        if record.state != AddressState::Free {
            warn!(
                address = %record.address,
                state = %record.state,
                "candidate taken before it could be locked"
            );
            return Err(AddressError::capacity(
                request.zone_id,
                request.pod_id,
                format!("address {} was leased concurrently", record.address),
            ));
        }

        record.allocated_to_account = Some(owner.id);
        record.allocated_in_domain = Some(owner.domain_id);
        record.source_nat = request.source_nat;
        record.system = request.system;
        record.display = request.display.unwrap_or(true);
        record.allocated_at = Some(Utc::now());
        if request.usage != VlanUsage::DirectAttached {
            record.associated_network = request.guest_network;
            record.vpc_id = request
                .vpc_id
                .or_else(|| guest_network.as_ref().and_then(|n| n.vpc_id));
        }

        let (next, _) = record.state.transition(&AddressInput::Allocate)?;
        record.state = next;

        if request.auto_promote {
            self.stage_promotion(&mut tx, &mut record, Some(&owner), dedicated)?;
        }

        let id = record.id;
        tx.update(record)?;
        let effects = tx.commit()?;
        self.effects.execute(effects).await;
        drop(promotion);

        let leased = self.store.address(id)?;
        info!(
            address = %leased.address,
            state = %leased.state,
            source_nat = leased.source_nat,
            dedicated,
            "address leased"
        );

        if request.usage == VlanUsage::VirtualNetwork {
            if let Err(e) = self.rule_managers.seed_system_firewall_rules(&leased).await {
                warn!(address = %leased.address, error = %e, "failed to seed system firewall rules");
            }
        }

        Ok(leased)
    }

    /// Pick a free record; the flag says whether it came from a dedicated range
    fn find_candidate(
        &self,
        request: &LeaseRequest,
        owner: &Account,
        guest_network: Option<&Network>,
    ) -> AddressResult<(AddressRecord, bool)> {
        let zone = request.zone_id;

        let mut dedicated = Vec::new();
        if !guest_network.is_some_and(Network::is_shared) {
            dedicated.extend(self.store.vlans_dedicated_to_account(zone, owner.id)?);
        }
        dedicated.extend(self.store.vlans_dedicated_to_domain(zone, owner.domain_id)?);
        let dedicated = request.filtered(dedicated);
        let shared = request.filtered(self.store.shared_vlans(zone)?);

        let (primary, fallback) = if dedicated.is_empty() {
            (shared, None)
        } else {
            (dedicated, Some(shared))
        };
        if primary.is_empty() {
            return Err(AddressError::capacity(
                zone,
                request.pod_id,
                "no vlan ranges available",
            ));
        }

        let mut query = FreeAddressQuery {
            zone_id: zone,
            vlans: primary,
            usage: request.usage,
            requested: request.requested_address,
            pod_id: request.pod_id,
            ip_version: request.ip_version,
            network_id: match request.usage {
                VlanUsage::DirectAttached => request.guest_network,
                VlanUsage::VirtualNetwork => None,
            },
            for_system_vms: request.for_system_vms,
            strict_system_vm_reservation: self.config.system_vm_ip_reservation_strict,
        };

        let from_dedicated = fallback.is_some();
        if let Some(found) = self.store.find_free(&query)? {
            return Ok((found, from_dedicated));
        }

        if let Some(shared) = fallback {
            if !shared.is_empty() && owner.may_use_system_ips(self.config.use_system_public_ips) {
                debug!(owner = %owner.id, "dedicated ranges exhausted, trying the shared pool");
                query.vlans = shared;
                if let Some(found) = self.store.find_free(&query)? {
                    return Ok((found, false));
                }
            }
        }

        warn!(zone = %zone, pod = ?request.pod_id, requested = ?request.requested_address, "no free address");
        Err(AddressError::capacity(
            zone,
            request.pod_id,
            match request.requested_address {
                Some(ip) => format!("requested address {} is not available", ip),
                None => "no free address in the candidate ranges".to_string(),
            },
        ))
    }

    /// Flip a locked record to `Allocated` and stage its bookkeeping
    ///
    /// Callers hold the promotion mutex.
    pub(crate) fn stage_promotion(
        &self,
        tx: &mut Transaction<'_>,
        record: &mut AddressRecord,
        owner: Option<&Account>,
        dedicated: bool,
    ) -> AddressResult<()> {
        let (next, bookkeeping) = record.state.transition(&AddressInput::Promote)?;
        record.state = next;

        let Some(owner) = owner.filter(|o| !o.is_system()) else {
            return Ok(());
        };
        if dedicated {
            return Ok(());
        }
        if bookkeeping == Bookkeeping::Charge && record.is_associated() {
            tx.defer(PendingEffect::ChargePublicIp(owner.id));
        }
        let usage = self.store.usage_of(record)?;
        tx.defer(PendingEffect::Usage(UsageEvent::for_record(
            UsageEventKind::assign_for(record),
            owner.id,
            record,
            usage,
        )));
        Ok(())
    }

    pub(super) async fn allocate_ip_inner(
        &self,
        owner: AccountId,
        zone: ZoneId,
        display: bool,
    ) -> AddressResult<AddressRecord> {
        let _account = self
            .store
            .locks()
            .lock_account(owner, self.config.lock_wait)
            .await?;
        self.lease(LeaseRequest::new(zone, owner, VlanUsage::VirtualNetwork).display(display))
            .await
    }

    pub(super) async fn assign_public_ip_inner(
        &self,
        request: LeaseRequest,
    ) -> AddressResult<AddressRecord> {
        let _account = self
            .store
            .locks()
            .lock_account(request.owner, self.config.lock_wait)
            .await?;
        self.lease(request.auto_promote()).await
    }

    pub(super) async fn assign_source_nat_ip_inner(
        &self,
        owner: AccountId,
        network: NetworkId,
    ) -> AddressResult<AddressRecord> {
        let _account = self
            .store
            .locks()
            .lock_account(owner, self.config.lock_wait)
            .await?;
        let network = self.networks.network(network).await?;

        if let Some(existing) = self.store.source_nat_for_network(network.id)? {
            debug!(network = %network.id, address = %existing.address, "source nat already assigned");
            return Ok(existing);
        }

        self.lease(
            LeaseRequest::new(network.zone_id, owner, VlanUsage::VirtualNetwork)
                .for_network(network.id)
                .in_vpc(network.vpc_id)
                .source_nat()
                .auto_promote(),
        )
        .await
    }

    pub(super) async fn associate_to_network_inner(
        &self,
        address: AddressId,
        network: NetworkId,
    ) -> AddressResult<AddressRecord> {
        let snapshot = self.store.address(address)?;
        let owner_id = snapshot.allocated_to_account.ok_or_else(|| {
            AddressError::InvalidParameter(format!("address {} is not allocated", snapshot.address))
        })?;
        let network = self.networks.network(network).await?;
        let owner = self.accounts.account(owner_id).await?;

        let _account = self
            .store
            .locks()
            .lock_account(owner_id, self.config.lock_wait)
            .await?;

        let mut tx = self.store.transaction();
        let mut record = tx.lock_address(address, self.config.lock_wait).await?;

        if record.associated_network == Some(network.id) {
            return Ok(record);
        }
        validate_association(&record, owner_id, &network)?;

        let newly_charged = record.state == AddressState::Allocated
            && !record.is_associated()
            && !owner.is_system()
            && !self.store.is_dedicated(&record)?;

        record.associated_network = Some(network.id);
        if record.vpc_id.is_none() {
            record.vpc_id = network.vpc_id;
        }
        if newly_charged {
            tx.defer(PendingEffect::ChargePublicIp(owner_id));
        }

        tx.update(record)?;
        let effects = tx.commit()?;
        self.effects.execute(effects).await;
        info!(address = %snapshot.address, network = %network.id, "address associated with network");

        if network.is_implemented() {
            self.apply_ip_associations(&network, false).await?;
        }
        self.store.address(address)
    }
}

fn validate_association(
    record: &AddressRecord,
    owner: AccountId,
    network: &Network,
) -> AddressResult<()> {
    if record.allocated_to_account != Some(owner) {
        return Err(AddressError::InvalidParameter(format!(
            "address {} changed owner",
            record.address
        )));
    }
    if !matches!(record.state, AddressState::Allocating | AddressState::Allocated) {
        return Err(AddressError::InvalidParameter(format!(
            "address {} is {}",
            record.address, record.state
        )));
    }
    if record.associated_network.is_some() {
        return Err(AddressError::InvalidParameter(format!(
            "address {} is already associated with another network",
            record.address
        )));
    }
    if record.zone_id != network.zone_id {
        return Err(AddressError::InvalidParameter(format!(
            "address {} and network {} are in different zones",
            record.address, network.id
        )));
    }
    if network.account_id != owner && !network.is_shared() {
        return Err(AddressError::InvalidParameter(format!(
            "network {} belongs to another account",
            network.id
        )));
    }
    Ok(())
}
