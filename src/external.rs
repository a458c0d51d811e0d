// Copyright (c) 2025 - Cowboy AI, Inc.
//! Collaborator interfaces
//!
//! Everything the address manager consumes but does not own: provider
//! elements, rule evidence, quota bookkeeping, usage emission, identity and
//! network metadata, and the rule managers that revoke configuration bound to
//! an address. In-memory implementations live in [`crate::adapters`].

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::{
    Account, AccountId, Actor, AddressId, AddressRecord, Network, NetworkId, Provider,
    RulePurpose, RuleRecord, Service, StaticNatRule,
};
use crate::errors::AddressResult;
use crate::events::UsageEvent;

/// Capability that programs public addresses onto a device
#[async_trait]
pub trait IpDeployer: Send + Sync {
    async fn apply_ips(
        &self,
        network: &Network,
        addresses: &[AddressRecord],
        services: &BTreeSet<Service>,
    ) -> AddressResult<()>;
}

/// Network element implementing one provider
pub trait NetworkElement: Send + Sync {
    fn provider(&self) -> Provider;

    /// IP deployer for this network, if the element can deploy addresses
    fn ip_deployer(&self, network: &Network) -> Option<Arc<dyn IpDeployer>>;
}

/// Read-only access to rule rows
#[async_trait]
pub trait RuleStateQuery: Send + Sync {
    /// Every rule row attached to the address
    async fn rules_for_address(&self, address: AddressId) -> AddressResult<Vec<RuleRecord>>;
}

/// Public-IP quota bookkeeping
#[async_trait]
pub trait ResourceLimits: Send + Sync {
    /// Fails with `ResourceAllocation` when one more public IP would exceed
    /// the account's limit
    async fn check_limit(&self, account: &Account) -> AddressResult<()>;
    async fn increment(&self, account: AccountId) -> AddressResult<()>;
    async fn decrement(&self, account: AccountId) -> AddressResult<()>;
}

/// Fire-and-forget usage emission
#[async_trait]
pub trait UsageEventSink: Send + Sync {
    async fn emit(&self, event: &UsageEvent) -> AddressResult<()>;
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account(&self, id: AccountId) -> AddressResult<Account>;
}

#[async_trait]
pub trait NetworkCatalog: Send + Sync {
    async fn network(&self, id: NetworkId) -> AddressResult<Network>;
}

/// Managers owning configuration that hangs off a public address
#[async_trait]
pub trait RuleManagers: Send + Sync {
    async fn revoke_firewall_rules(&self, address: AddressId, actor: &Actor) -> AddressResult<()>;

    /// Port forwarding rules and the static NAT mapping
    async fn revoke_port_forwarding_and_static_nat(
        &self,
        address: AddressId,
        actor: &Actor,
    ) -> AddressResult<()>;

    async fn revoke_load_balancers(&self, address: AddressId, actor: &Actor) -> AddressResult<()>;

    async fn revoke_vpn(&self, address: AddressId, actor: &Actor) -> AddressResult<()>;

    /// Default deny-all ingress rules for a freshly leased address
    async fn seed_system_firewall_rules(&self, address: &AddressRecord) -> AddressResult<()>;
}

/// Programs network rules of one purpose
#[async_trait]
pub trait NetworkRuleApplier: Send + Sync {
    async fn apply_rules(
        &self,
        network: &Network,
        purpose: RulePurpose,
        rules: &[RuleRecord],
    ) -> AddressResult<()>;
}

/// Programs static NAT mappings
#[async_trait]
pub trait StaticNatApplier: Send + Sync {
    async fn apply_static_nats(
        &self,
        network: &Network,
        rules: &[StaticNatRule],
    ) -> AddressResult<()>;
}
