// Copyright (c) 2025 - Cowboy AI, Inc.
//! Promotion, release and settlement
//!
//! ```text
//! Allocating ──promote_to_allocated──> Allocated
//!      │                                   │
//!      └──────── mark_unavailable ─────────┘
//!                      │
//!                      ▼
//!                  Releasing ──apply_ip_associations / free_released──> Free
//! ```

use tracing::{debug, error, info, warn};

use super::AddressManager;
use crate::domain::{Actor, AddressId, AddressRecord, AddressState, Network};
use crate::effects::PendingEffect;
use crate::errors::AddressResult;
use crate::events::{UsageEvent, UsageEventKind};
use crate::state_machine::address_lifecycle::{AddressInput, Bookkeeping};
use crate::state_machine::StateMachine;

impl AddressManager {
    /// Promote an `Allocating` (or `Free`) address to `Allocated`
    ///
    /// Best effort: returns `false` without escalating when the address is in
    /// any other state or when locking or persisting fails.
    pub async fn promote_to_allocated(&self, address: AddressId) -> bool {
        let _promotion = self.promotion.lock().await;

        match self.promote_locked(address).await {
            Ok(promoted) => promoted,
            Err(e) => {
                error!(%address, error = %e, "failed to promote address, bookkeeping not applied");
                false
            }
        }
    }

    async fn promote_locked(&self, address: AddressId) -> AddressResult<bool> {
        let mut tx = self.store.transaction();
        let mut record = tx.lock_address(address, self.config.lock_wait).await?;
        if !matches!(record.state, AddressState::Allocating | AddressState::Free) {
            debug!(address = %record.address, state = %record.state, "promotion is a no-op");
            return Ok(false);
        }

        let owner = match record.allocated_to_account {
            Some(id) => Some(self.accounts.account(id).await?),
            None => None,
        };
        let dedicated = self.store.is_dedicated(&record)?;
        self.stage_promotion(&mut tx, &mut record, owner.as_ref(), dedicated)?;

        let ip = record.address;
        tx.update(record)?;
        let effects = tx.commit()?;
        self.effects.execute(effects).await;
        info!(address = %ip, "address promoted to allocated");
        Ok(true)
    }

    /// Withdraw an address: `Allocating | Allocated → Releasing`
    ///
    /// No-op for unowned addresses and for addresses already releasing.
    pub async fn mark_unavailable(&self, address: AddressId) -> AddressResult<AddressRecord> {
        let mut tx = self.store.transaction();
        let mut record = tx.lock_address(address, self.config.lock_wait).await?;

        if record.is_unowned() || record.state == AddressState::Releasing {
            debug!(address = %record.address, state = %record.state, "nothing to mark unavailable");
            return Ok(record);
        }

        let (next, bookkeeping) = record.state.transition(&AddressInput::BeginRelease)?;

        if bookkeeping == Bookkeeping::Refund {
            if let Some(owner_id) = record.allocated_to_account {
                let owner = self.accounts.account(owner_id).await?;
                if !owner.is_system() && !self.store.is_dedicated(&record)? {
                    if record.is_associated() {
                        tx.defer(PendingEffect::RefundPublicIp(owner_id));
                    }
                    let usage = self.store.usage_of(&record)?;
                    tx.defer(PendingEffect::Usage(UsageEvent::for_record(
                        UsageEventKind::release_for(&record),
                        owner_id,
                        &record,
                        usage,
                    )));
                }
            }
        }

        record.state = next;
        let ip = record.address;
        tx.update(record)?;
        let effects = tx.commit()?;
        self.effects.execute(effects).await;
        info!(address = %ip, "address marked unavailable");

        self.store.address(address)
    }

    /// Return a `Releasing` address to the pool
    pub async fn free_released(&self, address: AddressId) -> AddressResult<AddressRecord> {
        let mut tx = self.store.transaction();
        let mut record = tx.lock_address(address, self.config.lock_wait).await?;
        if record.state == AddressState::Free {
            return Ok(record);
        }

        let (next, _) = record.state.transition(&AddressInput::CompleteRelease)?;
        record.state = next;
        record.clear_lease();

        let ip = record.address;
        tx.update(record)?;
        tx.commit()?;
        info!(address = %ip, "address returned to the pool");

        self.store.address(address)
    }

    /// Free a released address, or hand a portable one back to the region
    async fn finish_release(&self, record: &AddressRecord) -> AddressResult<()> {
        if record.portable {
            self.release_portable_ip_inner(record.id).await
        } else {
            self.free_released(record.id).await.map(|_| ())
        }
    }

    /// Revoke every rule family bound to the address
    ///
    /// Every step runs even when an earlier one failed.
    pub async fn cleanup_address_resources(&self, address: AddressId, actor: &Actor) -> bool {
        let steps = [
            ("firewall", self.rule_managers.revoke_firewall_rules(address, actor).await),
            (
                "port forwarding and static nat",
                self.rule_managers
                    .revoke_port_forwarding_and_static_nat(address, actor)
                    .await,
            ),
            ("load balancer", self.rule_managers.revoke_load_balancers(address, actor).await),
            ("vpn", self.rule_managers.revoke_vpn(address, actor).await),
        ];

        let mut success = true;
        for (step, result) in steps {
            if let Err(e) = result {
                warn!(%address, step, error = %e, "failed to revoke address resources");
                success = false;
            }
        }
        success
    }

    /// Settle a network's addresses with its providers
    ///
    /// Reconciles post-apply, then promotes `Allocating` addresses and frees
    /// `Releasing` ones whose resources clean up.
    pub async fn apply_ip_associations(
        &self,
        network: &Network,
        continue_on_error: bool,
    ) -> AddressResult<bool> {
        let addresses = self.store.list_by_network(network.id)?;
        let mut success = self
            .association
            .reconcile(network, addresses.clone(), true, continue_on_error)
            .await?;
        if !success {
            warn!(network = %network.id, "providers did not settle every address");
            return Ok(false);
        }

        let system = Actor::system();
        for address in addresses {
            match address.state {
                AddressState::Allocating => {
                    self.promote_to_allocated(address.id).await;
                }
                AddressState::Releasing => {
                    if self.cleanup_address_resources(address.id, &system).await {
                        self.finish_release(&address).await?;
                    } else {
                        warn!(address = %address.address, "cleanup failed, address stays releasing");
                        success = false;
                    }
                }
                AddressState::Free | AddressState::Allocated => {}
            }
        }

        Ok(success)
    }

    pub(super) async fn release_inner(
        &self,
        address: AddressId,
        actor: &Actor,
    ) -> AddressResult<bool> {
        let snapshot = self.store.address(address)?;
        info!(address = %snapshot.address, actor = %actor.user_id, "releasing address");

        let mut success = self.cleanup_address_resources(address, actor).await;
        let record = self.mark_unavailable(address).await?;

        match record.associated_network {
            Some(network_id) => {
                let settled = match self.networks.network(network_id).await {
                    Ok(network) => self.apply_ip_associations(&network, true).await,
                    Err(e) => Err(e),
                };
                match settled {
                    Ok(ok) => success &= ok,
                    Err(e) => {
                        warn!(address = %record.address, error = %e, "failed to settle released address");
                        success = false;
                    }
                }
            }
            // a portable address that failed cleanup stays releasing
            None if record.state == AddressState::Releasing && (success || !record.portable) => {
                self.finish_release(&record).await?;
            }
            None => {}
        }

        if !success {
            warn!(address = %record.address, "address release incomplete");
        }
        Ok(success)
    }
}
