// Copyright (c) 2025 - Cowboy AI, Inc.
//! Explicit transaction handle
//!
//! A [`Transaction`] stages writes and post-commit effects. Records are
//! locked with [`Transaction::lock_address`], which also re-reads them, and
//! every staged update is applied at [`Transaction::commit`] only if the row
//! version still equals the one read under the lock. Dropping the handle
//! without committing discards all staged work and releases the row locks.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, error};

use super::Datastore;
use crate::domain::{AddressId, AddressRecord, PortableIpId, PortableIpRecord, VlanRange};
use crate::effects::PendingEffect;
use crate::errors::{AddressError, AddressResult};
use crate::locks::LockHandle;
use crate::state_machine::address_lifecycle::is_persistable;

/// Unit of work over the datastore
pub struct Transaction<'a> {
    store: &'a Datastore,
    row_locks: BTreeMap<AddressId, LockHandle<AddressId>>,
    updates: BTreeMap<AddressId, AddressRecord>,
    inserts: Vec<AddressRecord>,
    deletes: BTreeMap<AddressId, u64>,
    portable: BTreeMap<PortableIpId, PortableIpRecord>,
    vlans: Vec<VlanRange>,
    effects: Vec<PendingEffect>,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(store: &'a Datastore) -> Self {
        Self {
            store,
            row_locks: BTreeMap::new(),
            updates: BTreeMap::new(),
            inserts: Vec::new(),
            deletes: BTreeMap::new(),
            portable: BTreeMap::new(),
            vlans: Vec::new(),
            effects: Vec::new(),
        }
    }

    /// Row-lock an address and read it fresh
    ///
    /// Re-locking a row already held by this transaction returns the staged
    /// copy when there is one.
    pub async fn lock_address(
        &mut self,
        id: AddressId,
        wait: Duration,
    ) -> AddressResult<AddressRecord> {
        if self.row_locks.contains_key(&id) {
            if let Some(staged) = self.updates.get(&id) {
                return Ok(staged.clone());
            }
            return self.store.address(id);
        }

        let handle = self.store.locks().lock_row(id, wait).await?;
        let record = self.store.address(id)?;
        self.row_locks.insert(id, handle);
        debug!(address = %record.address, state = %record.state, version = record.version, "row locked");
        Ok(record)
    }

    /// Stage an update of a locked record
    ///
    /// `record.version` must be the version read under the lock.
    pub fn update(&mut self, record: AddressRecord) -> AddressResult<()> {
        if !self.row_locks.contains_key(&record.id) {
            return Err(AddressError::InvariantViolation(format!(
                "update of address {} without holding its row lock",
                record.address
            )));
        }
        self.updates.insert(record.id, record);
        Ok(())
    }

    /// Stage a new record
    pub fn insert(&mut self, record: AddressRecord) {
        self.inserts.push(record);
    }

    /// Stage deletion of a locked record
    pub fn delete(&mut self, record: &AddressRecord) -> AddressResult<()> {
        if !self.row_locks.contains_key(&record.id) {
            return Err(AddressError::InvariantViolation(format!(
                "delete of address {} without holding its row lock",
                record.address
            )));
        }
        self.updates.remove(&record.id);
        self.deletes.insert(record.id, record.version);
        Ok(())
    }

    /// Stage a portable pool update; callers hold the portable pool lock
    pub fn update_portable(&mut self, record: PortableIpRecord) {
        self.portable.insert(record.id, record);
    }

    /// Stage a VLAN range without expanding it into records
    pub fn insert_vlan(&mut self, vlan: VlanRange) {
        self.vlans.push(vlan);
    }

    /// Stage an effect to run after commit
    pub fn defer(&mut self, effect: PendingEffect) {
        self.effects.push(effect);
    }

    /// Apply every staged write atomically and hand back the staged effects
    ///
    /// A version mismatch or an illegal persisted state change fails the
    /// whole commit with [`AddressError::InvariantViolation`] and nothing is
    /// written.
    pub fn commit(self) -> AddressResult<Vec<PendingEffect>> {
        let Transaction {
            store,
            row_locks,
            updates,
            inserts,
            deletes,
            portable,
            vlans,
            effects,
        } = self;

        let mut tables = store.write()?;

        for record in updates.values() {
            let current = tables.addresses.get(&record.id).ok_or_else(|| {
                AddressError::InvariantViolation(format!("address {} vanished", record.address))
            })?;
            if current.version != record.version {
                error!(
                    address = %record.address,
                    expected = record.version,
                    actual = current.version,
                    "conditional update lost"
                );
                return Err(AddressError::InvariantViolation(format!(
                    "address {} changed since it was locked (version {} != {})",
                    record.address, current.version, record.version
                )));
            }
            if !is_persistable(current.state, record.state) {
                return Err(AddressError::InvariantViolation(format!(
                    "address {} cannot move from {} to {}",
                    record.address, current.state, record.state
                )));
            }
        }
        for (id, version) in &deletes {
            match tables.addresses.get(id) {
                Some(current) if current.version == *version => {}
                _ => {
                    return Err(AddressError::InvariantViolation(format!(
                        "address {} changed before delete",
                        id
                    )))
                }
            }
        }
        for record in &inserts {
            if tables.by_ip.contains_key(&(record.zone_id, record.address)) {
                return Err(AddressError::InvariantViolation(format!(
                    "address {} already exists in zone {}",
                    record.address, record.zone_id
                )));
            }
        }

        for vlan in vlans {
            tables.vlans.entry(vlan.id).or_insert(vlan);
        }
        for (id, _) in deletes {
            if let Some(removed) = tables.addresses.remove(&id) {
                tables.by_ip.remove(&(removed.zone_id, removed.address));
            }
        }
        for (id, mut record) in updates {
            record.version += 1;
            tables.addresses.insert(id, record);
        }
        for record in inserts {
            tables.by_ip.insert((record.zone_id, record.address), record.id);
            tables.addresses.insert(record.id, record);
        }
        for (id, record) in portable {
            tables.portable.insert(id, record);
        }

        drop(tables);
        drop(row_locks);
        Ok(effects)
    }
}
