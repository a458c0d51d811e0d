// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for Address Management
//!
//! [`AddressManager`] orchestrates the datastore, the locking layer, the
//! address state machine and the association protocol.
//!
//! # Architecture
//!
//! ```text
//! Client Request
//!     ↓
//! AddressService (this module)
//!     ↓                       ↓
//! account lock          promotion mutex
//!     ↓                       ↓
//! Transaction (row locks, version-checked commit)
//!     ↓
//! EffectExecutor (quota counters, usage events)
//!     ↓
//! AssociationProtocol → provider IP deployers
//! ```
//!
//! # Transaction Semantics
//!
//! Each mutating step is one [`Transaction`](crate::datastore::Transaction):
//! 1. Row-lock and re-read the address
//! 2. Apply a state machine input
//! 3. Stage counter and usage effects
//! 4. Commit with a version check
//! 5. Run the effects
//!
//! If any step before commit fails nothing is written.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = AddressManager::builder()
//!     .config(AddressManagerConfig::from_env()?)
//!     .datastore(store)
//!     .directory(directory.clone(), directory)
//!     .limits(limits)
//!     .usage_sink(usage)
//!     .rule_managers(rule_managers)
//!     .provider_bindings(bindings)
//!     .elements(elements)
//!     .build()?;
//!
//! let ip = manager.assign_source_nat_ip(owner, network).await?;
//! ```

pub mod allocation;
pub mod lifecycle;
pub mod portable;

pub use allocation::LeaseRequest;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::association::{AssociationProtocol, ElementRegistry, ProviderBindingTable};
use crate::config::AddressManagerConfig;
use crate::datastore::Datastore;
use crate::domain::{
    AccountId, Actor, AddressId, AddressRecord, NetworkId, RulePurpose, RuleRecord,
    StaticNatRule, VpcId, ZoneId,
};
use crate::effects::EffectExecutor;
use crate::errors::{AddressError, AddressResult};
use crate::external::{
    AccountDirectory, NetworkCatalog, NetworkRuleApplier, ResourceLimits, RuleManagers,
    RuleStateQuery, StaticNatApplier, UsageEventSink,
};

/// Address management service interface
#[async_trait]
pub trait AddressService: Send + Sync {
    /// Acquire a public address for an account; it lands `Allocating` and
    /// unassociated
    async fn allocate_ip(
        &self,
        owner: AccountId,
        zone: ZoneId,
        display: bool,
    ) -> AddressResult<AddressRecord>;

    /// Lease and promote in one step (system VMs, direct-attached NICs)
    async fn assign_public_ip(&self, request: LeaseRequest) -> AddressResult<AddressRecord>;

    /// The network's source NAT address, leased on first use
    async fn assign_source_nat_ip(
        &self,
        owner: AccountId,
        network: NetworkId,
    ) -> AddressResult<AddressRecord>;

    /// Bind an owned, unassociated address to a guest network
    async fn associate_to_network(
        &self,
        address: AddressId,
        network: NetworkId,
    ) -> AddressResult<AddressRecord>;

    /// Revoke everything bound to the address and return it to the pool
    ///
    /// `Ok(false)` when some cleanup step failed; the address is still
    /// marked unavailable.
    async fn release(&self, address: AddressId, actor: &Actor) -> AddressResult<bool>;

    /// Program rules of one purpose with association before and after
    async fn apply_rules(
        &self,
        rules: &[RuleRecord],
        purpose: RulePurpose,
        applier: &dyn NetworkRuleApplier,
        continue_on_error: bool,
    ) -> AddressResult<bool>;

    /// Program static NAT rules with association before and after
    async fn apply_static_nats(
        &self,
        rules: &[StaticNatRule],
        applier: &dyn StaticNatApplier,
        continue_on_error: bool,
        for_revoke: bool,
    ) -> AddressResult<bool>;

    /// Take an address from the region-wide portable pool
    async fn allocate_portable_ip(
        &self,
        owner: AccountId,
        zone: ZoneId,
        network: Option<NetworkId>,
        vpc: Option<VpcId>,
    ) -> AddressResult<AddressRecord>;

    /// Return a released portable address to the region pool
    async fn release_portable_ip(&self, address: AddressId) -> AddressResult<()>;

    /// Move an allocated portable address to another network
    async fn transfer_portable_ip(
        &self,
        address: AddressId,
        target_network: NetworkId,
    ) -> AddressResult<AddressRecord>;
}

/// Address manager
pub struct AddressManager {
    pub(crate) config: AddressManagerConfig,
    pub(crate) store: Arc<Datastore>,
    pub(crate) accounts: Arc<dyn AccountDirectory>,
    pub(crate) networks: Arc<dyn NetworkCatalog>,
    pub(crate) limits: Arc<dyn ResourceLimits>,
    pub(crate) rule_managers: Arc<dyn RuleManagers>,
    pub(crate) association: AssociationProtocol,
    pub(crate) effects: EffectExecutor,
    /// Guards the Allocated flip together with its bookkeeping
    pub(crate) promotion: Mutex<()>,
}

impl AddressManager {
    pub fn builder() -> AddressManagerBuilder {
        AddressManagerBuilder::default()
    }

    pub fn config(&self) -> &AddressManagerConfig {
        &self.config
    }

    pub fn datastore(&self) -> &Arc<Datastore> {
        &self.store
    }

    pub fn association(&self) -> &AssociationProtocol {
        &self.association
    }

    /// Look up an address by zone and IP
    pub fn find_address(&self, zone: ZoneId, ip: IpAddr) -> AddressResult<AddressRecord> {
        self.store
            .find_by_ip(zone, ip)?
            .ok_or_else(|| AddressError::not_found("address", ip))
    }
}

/// Builder for [`AddressManager`]
#[derive(Default)]
pub struct AddressManagerBuilder {
    config: Option<AddressManagerConfig>,
    store: Option<Arc<Datastore>>,
    rules: Option<Arc<dyn RuleStateQuery>>,
    accounts: Option<Arc<dyn AccountDirectory>>,
    networks: Option<Arc<dyn NetworkCatalog>>,
    limits: Option<Arc<dyn ResourceLimits>>,
    usage: Option<Arc<dyn UsageEventSink>>,
    rule_managers: Option<Arc<dyn RuleManagers>>,
    bindings: Option<ProviderBindingTable>,
    elements: Option<ElementRegistry>,
}

impl AddressManagerBuilder {
    pub fn config(mut self, config: AddressManagerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn datastore(mut self, store: Arc<Datastore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Rule evidence source; defaults to the datastore's rule table
    pub fn rule_query(mut self, rules: Arc<dyn RuleStateQuery>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn directory(
        mut self,
        accounts: Arc<dyn AccountDirectory>,
        networks: Arc<dyn NetworkCatalog>,
    ) -> Self {
        self.accounts = Some(accounts);
        self.networks = Some(networks);
        self
    }

    pub fn limits(mut self, limits: Arc<dyn ResourceLimits>) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn usage_sink(mut self, usage: Arc<dyn UsageEventSink>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn rule_managers(mut self, managers: Arc<dyn RuleManagers>) -> Self {
        self.rule_managers = Some(managers);
        self
    }

    pub fn provider_bindings(mut self, bindings: ProviderBindingTable) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn elements(mut self, elements: ElementRegistry) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn build(self) -> AddressResult<AddressManager> {
        fn missing(what: &str) -> AddressError {
            AddressError::Configuration(format!("address manager needs {}", what))
        }

        let config = self.config.unwrap_or_default();
        let store = self.store.ok_or_else(|| missing("a datastore"))?;
        let rules: Arc<dyn RuleStateQuery> = match self.rules {
            Some(rules) => rules,
            None => store.clone(),
        };
        let accounts = self.accounts.ok_or_else(|| missing("an account directory"))?;
        let networks = self.networks.ok_or_else(|| missing("a network catalog"))?;
        let limits = self.limits.ok_or_else(|| missing("resource limits"))?;
        let usage = self.usage.ok_or_else(|| missing("a usage sink"))?;
        let rule_managers = self.rule_managers.ok_or_else(|| missing("rule managers"))?;

        let association = AssociationProtocol::new(
            store.clone(),
            rules,
            networks.clone(),
            Arc::new(self.bindings.unwrap_or_default()),
            self.elements.unwrap_or_default(),
        );

        Ok(AddressManager {
            config,
            store,
            accounts,
            networks,
            limits: limits.clone(),
            rule_managers,
            association,
            effects: EffectExecutor::new(limits, usage),
            promotion: Mutex::new(()),
        })
    }
}

#[async_trait]
impl AddressService for AddressManager {
    async fn allocate_ip(
        &self,
        owner: AccountId,
        zone: ZoneId,
        display: bool,
    ) -> AddressResult<AddressRecord> {
        self.allocate_ip_inner(owner, zone, display).await
    }

    async fn assign_public_ip(&self, request: LeaseRequest) -> AddressResult<AddressRecord> {
        self.assign_public_ip_inner(request).await
    }

    async fn assign_source_nat_ip(
        &self,
        owner: AccountId,
        network: NetworkId,
    ) -> AddressResult<AddressRecord> {
        self.assign_source_nat_ip_inner(owner, network).await
    }

    async fn associate_to_network(
        &self,
        address: AddressId,
        network: NetworkId,
    ) -> AddressResult<AddressRecord> {
        self.associate_to_network_inner(address, network).await
    }

    async fn release(&self, address: AddressId, actor: &Actor) -> AddressResult<bool> {
        self.release_inner(address, actor).await
    }

    async fn apply_rules(
        &self,
        rules: &[RuleRecord],
        purpose: RulePurpose,
        applier: &dyn NetworkRuleApplier,
        continue_on_error: bool,
    ) -> AddressResult<bool> {
        self.association
            .apply_rules(rules, purpose, applier, continue_on_error)
            .await
    }

    async fn apply_static_nats(
        &self,
        rules: &[StaticNatRule],
        applier: &dyn StaticNatApplier,
        continue_on_error: bool,
        for_revoke: bool,
    ) -> AddressResult<bool> {
        self.association
            .apply_static_nats(rules, applier, continue_on_error, for_revoke)
            .await
    }

    async fn allocate_portable_ip(
        &self,
        owner: AccountId,
        zone: ZoneId,
        network: Option<NetworkId>,
        vpc: Option<VpcId>,
    ) -> AddressResult<AddressRecord> {
        self.allocate_portable_ip_inner(owner, zone, network, vpc).await
    }

    async fn release_portable_ip(&self, address: AddressId) -> AddressResult<()> {
        self.release_portable_ip_inner(address).await
    }

    async fn transfer_portable_ip(
        &self,
        address: AddressId,
        target_network: NetworkId,
    ) -> AddressResult<AddressRecord> {
        self.transfer_portable_ip_inner(address, target_network).await
    }
}
