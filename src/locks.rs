// Copyright (c) 2025 - Cowboy AI, Inc.
//! Locking layer
//!
//! Three kinds of lock guard the address pool:
//!
//! - **account locks** serialize allocate-and-decide per owner;
//! - **row locks** pin one address record for the life of a transaction;
//! - **named global locks** guard region-wide pools such as the portable
//!   address range.
//!
//! All of them are keyed async mutexes acquired with a bounded wait. A
//! timeout surfaces as [`AddressError::Concurrency`] and is never retried.
//! Guards release on drop, so every exit path unlocks.
//!
//! Lock order is account → promotion mutex → row.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{trace, warn};

use crate::domain::{AccountId, AddressId};
use crate::errors::{AddressError, AddressResult};

/// Name of the global lock guarding the portable address pool
pub const PORTABLE_IP_LOCK: &str = "PortablePublicIpRange";

type Entries<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Drop `key` from the table once nothing but the table and `mutex` refer to it
fn prune<K: Eq + Hash>(entries: &Entries<K>, key: &K, mutex: &Arc<AsyncMutex<()>>) {
    if let Ok(mut entries) = entries.lock() {
        if Arc::strong_count(mutex) == 2 {
            entries.remove(key);
        }
    }
}

/// Held lock; released on drop
pub struct LockHandle<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<AsyncMutex<()>>,
    entries: Entries<K>,
}

impl<K: Eq + Hash> LockHandle<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + fmt::Debug> fmt::Debug for LockHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle").field("key", &self.key).finish()
    }
}

impl<K: Eq + Hash> Drop for LockHandle<K> {
    fn drop(&mut self) {
        // the guard holds its own reference to the mutex
        self.guard.take();
        prune(&self.entries, &self.key, &self.mutex);
    }
}

/// Table of keyed async mutexes
///
/// Entries live only while a handle or a waiter refers to them.
pub struct LockTable<K> {
    name: &'static str,
    entries: Entries<K>,
}

impl<K> LockTable<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entry(&self, key: &K) -> AddressResult<Arc<AsyncMutex<()>>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AddressError::Concurrency(format!("{} lock table poisoned", self.name)))?;
        Ok(entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    fn handle(&self, key: K, mutex: Arc<AsyncMutex<()>>, guard: OwnedMutexGuard<()>) -> LockHandle<K> {
        LockHandle {
            key,
            guard: Some(guard),
            mutex,
            entries: self.entries.clone(),
        }
    }

    /// Acquire the lock for `key`, waiting at most `wait`
    pub async fn acquire_within(&self, key: K, wait: Duration) -> AddressResult<LockHandle<K>> {
        let mutex = self.entry(&key)?;
        match tokio::time::timeout(wait, mutex.clone().lock_owned()).await {
            Ok(guard) => {
                trace!(table = self.name, %key, "lock acquired");
                Ok(self.handle(key, mutex, guard))
            }
            Err(_) => {
                warn!(table = self.name, %key, ?wait, "lock wait timed out");
                prune(&self.entries, &key, &mutex);
                Err(AddressError::Concurrency(format!(
                    "unable to acquire {} lock on {} within {:?}",
                    self.name, key, wait
                )))
            }
        }
    }

    /// Try once without waiting
    pub fn try_acquire(&self, key: K) -> AddressResult<LockHandle<K>> {
        let mutex = self.entry(&key)?;
        match mutex.clone().try_lock_owned() {
            Ok(guard) => Ok(self.handle(key, mutex, guard)),
            Err(_) => Err(AddressError::Concurrency(format!(
                "{} lock on {} is held",
                self.name, key
            ))),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }
}

/// Lock tables shared by every datastore operation
pub struct LockManager {
    accounts: LockTable<AccountId>,
    globals: LockTable<String>,
    rows: LockTable<AddressId>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            accounts: LockTable::new("account"),
            globals: LockTable::new("global"),
            rows: LockTable::new("row"),
        }
    }

    pub async fn lock_account(
        &self,
        account: AccountId,
        wait: Duration,
    ) -> AddressResult<LockHandle<AccountId>> {
        self.accounts.acquire_within(account, wait).await
    }

    pub async fn lock_global(
        &self,
        name: &str,
        wait: Duration,
    ) -> AddressResult<LockHandle<String>> {
        self.globals.acquire_within(name.to_string(), wait).await
    }

    pub async fn lock_row(
        &self,
        address: AddressId,
        wait: Duration,
    ) -> AddressResult<LockHandle<AddressId>> {
        self.rows.acquire_within(address, wait).await
    }

    pub fn try_lock_row(&self, address: AddressId) -> AddressResult<LockHandle<AddressId>> {
        self.rows.try_acquire(address)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
