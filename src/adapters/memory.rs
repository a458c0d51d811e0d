// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process collaborators

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{Account, AccountId, Network, NetworkId, NetworkState};
use crate::errors::{AddressError, AddressResult};
use crate::events::UsageEvent;
use crate::external::{AccountDirectory, NetworkCatalog, ResourceLimits, UsageEventSink};

fn poisoned(what: &str) -> AddressError {
    AddressError::Concurrency(format!("{} lock poisoned", what))
}

/// Public-IP counters with one limit shared by every normal account
///
/// System accounts are never limited.
#[derive(Debug, Default)]
pub struct InMemoryResourceLimits {
    limit: Option<u64>,
    counts: Mutex<HashMap<AccountId, u64>>,
    checks: Mutex<u64>,
}

impl InMemoryResourceLimits {
    /// `None` means unlimited
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Current counter for an account
    pub fn count(&self, account: AccountId) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(&account).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of limit checks performed so far
    pub fn checks(&self) -> u64 {
        self.checks.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl ResourceLimits for InMemoryResourceLimits {
    async fn check_limit(&self, account: &Account) -> AddressResult<()> {
        *self.checks.lock().map_err(|_| poisoned("limit checks"))? += 1;

        let Some(limit) = self.limit else {
            return Ok(());
        };
        if account.is_system() {
            return Ok(());
        }
        let used = self.count(account.id);
        if used + 1 > limit {
            warn!(account = %account.id, used, limit, "public ip limit reached");
            return Err(AddressError::ResourceAllocation(format!(
                "account {} has {} of {} public ips",
                account.id, used, limit
            )));
        }
        Ok(())
    }

    async fn increment(&self, account: AccountId) -> AddressResult<()> {
        let mut counts = self.counts.lock().map_err(|_| poisoned("limit counters"))?;
        *counts.entry(account).or_insert(0) += 1;
        Ok(())
    }

    async fn decrement(&self, account: AccountId) -> AddressResult<()> {
        let mut counts = self.counts.lock().map_err(|_| poisoned("limit counters"))?;
        let count = counts.entry(account).or_insert(0);
        if *count == 0 {
            return Err(AddressError::InvariantViolation(format!(
                "public ip counter of account {} would go negative",
                account
            )));
        }
        *count -= 1;
        Ok(())
    }
}

/// Keeps every emitted usage event in memory
#[derive(Debug, Default)]
pub struct RecordingUsageSink {
    events: Mutex<Vec<UsageEvent>>,
}

impl RecordingUsageSink {
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UsageEventSink for RecordingUsageSink {
    async fn emit(&self, event: &UsageEvent) -> AddressResult<()> {
        debug!(kind = ?event.kind, address = %event.address, "usage event recorded");
        self.events
            .lock()
            .map_err(|_| poisoned("usage sink"))?
            .push(event.clone());
        Ok(())
    }
}

/// Fixed account directory and network catalog
#[derive(Debug, Default)]
pub struct StaticDirectory {
    accounts: RwLock<HashMap<AccountId, Account>>,
    networks: RwLock<HashMap<NetworkId, Network>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: Account) -> AddressResult<()> {
        self.accounts
            .write()
            .map_err(|_| poisoned("account directory"))?
            .insert(account.id, account);
        Ok(())
    }

    pub fn insert_network(&self, network: Network) -> AddressResult<()> {
        self.networks
            .write()
            .map_err(|_| poisoned("network catalog"))?
            .insert(network.id, network);
        Ok(())
    }

    pub fn set_network_state(&self, id: NetworkId, state: NetworkState) -> AddressResult<()> {
        self.networks
            .write()
            .map_err(|_| poisoned("network catalog"))?
            .get_mut(&id)
            .map(|n| n.state = state)
            .ok_or_else(|| AddressError::not_found("network", id))
    }
}

#[async_trait]
impl AccountDirectory for StaticDirectory {
    async fn account(&self, id: AccountId) -> AddressResult<Account> {
        self.accounts
            .read()
            .map_err(|_| poisoned("account directory"))?
            .get(&id)
            .cloned()
            .ok_or_else(|| AddressError::not_found("account", id))
    }
}

#[async_trait]
impl NetworkCatalog for StaticDirectory {
    async fn network(&self, id: NetworkId) -> AddressResult<Network> {
        self.networks
            .read()
            .map_err(|_| poisoned("network catalog"))?
            .get(&id)
            .cloned()
            .ok_or_else(|| AddressError::not_found("network", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountKind, DomainId};

    fn account(kind: AccountKind) -> Account {
        Account {
            id: AccountId::new(),
            domain_id: DomainId::new(),
            kind,
            use_system_public_ips: None,
        }
    }

    #[tokio::test]
    async fn test_limit_enforced_for_normal_accounts_only() {
        let limits = InMemoryResourceLimits::new(Some(1));
        let normal = account(AccountKind::Normal);
        let system = account(AccountKind::System);

        limits.check_limit(&normal).await.unwrap();
        limits.increment(normal.id).await.unwrap();
        assert!(matches!(
            limits.check_limit(&normal).await,
            Err(AddressError::ResourceAllocation(_))
        ));

        limits.increment(system.id).await.unwrap();
        limits.check_limit(&system).await.unwrap();
        assert_eq!(limits.checks(), 3);
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let directory = StaticDirectory::new();
        let a = account(AccountKind::Normal);
        directory.insert_account(a.clone()).unwrap();
        assert_eq!(directory.account(a.id).await.unwrap(), a);
        assert!(matches!(
            directory.account(AccountId::new()).await,
            Err(AddressError::NotFound { kind: "account", .. })
        ));
    }
}
