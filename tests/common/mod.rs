// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-address-manager
//!
//! Deterministic zones, accounts and networks plus recording collaborators.
//! Every integration test builds its manager through [`Harness`].
//!
//! # Design Principles
//! - Well-known entities use fixed UUIDs
//! - Collaborators record every call so tests assert on interactions
//! - Failures are injected per collaborator, never by patching the manager

#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use cim_address_manager::adapters::{InMemoryResourceLimits, RecordingUsageSink, StaticDirectory};
use cim_address_manager::association::{ElementRegistry, ProviderBindingTable};
use cim_address_manager::domain::{
    Account, AccountId, AccountKind, Actor, AddressId, AddressRecord, AddressState, Dedication,
    DomainId, GuestType, Network, NetworkId, NetworkState, PhysicalNetworkId, PodId,
    PortableIpRecord, Provider, RulePurpose, RuleRecord, Service, StaticNatRule, VlanId,
    VlanRange, VlanUsage, VpcId, ZoneId,
};
use cim_address_manager::errors::{AddressError, AddressResult};
use cim_address_manager::external::{
    IpDeployer, NetworkElement, NetworkRuleApplier, RuleManagers, StaticNatApplier,
};
use cim_address_manager::{AddressManager, AddressManagerConfig, Datastore};

// Fixed identities (UUID v7 layout, deterministic)
pub const ZONE_1: ZoneId = ZoneId::from_uuid(Uuid::from_u128(0x01934f4a_5a01_7000_8000_000000005a01));
pub const ZONE_2: ZoneId = ZoneId::from_uuid(Uuid::from_u128(0x01934f4a_5a02_7000_8000_000000005a02));
pub const POD_1: PodId = PodId::from_uuid(Uuid::from_u128(0x01934f4a_9001_7000_8000_000000009001));
pub const POD_2: PodId = PodId::from_uuid(Uuid::from_u128(0x01934f4a_9002_7000_8000_000000009002));
pub const PHYSICAL_1: PhysicalNetworkId =
    PhysicalNetworkId::from_uuid(Uuid::from_u128(0x01934f4a_f001_7000_8000_00000000f001));

pub const DOMAIN_1: DomainId = DomainId::from_uuid(Uuid::from_u128(0x01934f4a_d001_7000_8000_00000000d001));
pub const DOMAIN_2: DomainId = DomainId::from_uuid(Uuid::from_u128(0x01934f4a_d002_7000_8000_00000000d002));

pub const ACCOUNT_A: AccountId =
    AccountId::from_uuid(Uuid::from_u128(0x01934f4a_a00a_7000_8000_00000000a00a));
pub const ACCOUNT_B: AccountId =
    AccountId::from_uuid(Uuid::from_u128(0x01934f4a_a00b_7000_8000_00000000a00b));

/// Isolated, implemented, conserve mode, zone 1, owned by A
pub const NETWORK_1: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e001_7000_8000_00000000e001));
/// Isolated, allocated (not implemented), zone 1, owned by A
pub const NETWORK_2: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e002_7000_8000_00000000e002));
/// Isolated, implemented, non-conserve, zone 1, owned by A
pub const NETWORK_STRICT: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e003_7000_8000_00000000e003));
/// Shared, implemented, zone 1, owned by the system account
pub const NETWORK_SHARED: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e004_7000_8000_00000000e004));
/// VPC tier, implemented, zone 1, owned by A
pub const NETWORK_VPC: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e005_7000_8000_00000000e005));
/// Isolated, implemented, zone 2, owned by A
pub const NETWORK_ZONE_2: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e006_7000_8000_00000000e006));
/// Isolated, implemented, zone 1, owned by B
pub const NETWORK_B: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e007_7000_8000_00000000e007));
/// Isolated, implemented, zone 1, owned by A, no provider bound
pub const NETWORK_UNBOUND: NetworkId =
    NetworkId::from_uuid(Uuid::from_u128(0x01934f4a_e008_7000_8000_00000000e008));

pub const VPC_1: VpcId = VpcId::from_uuid(Uuid::from_u128(0x01934f4a_c001_7000_8000_00000000c001));

pub const ALL_SERVICES: [Service; 6] = [
    Service::SourceNat,
    Service::StaticNat,
    Service::Lb,
    Service::PortForwarding,
    Service::Vpn,
    Service::Firewall,
];

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("Invalid IP in test fixture")
}

pub fn account(id: AccountId, domain: DomainId, kind: AccountKind) -> Account {
    Account {
        id,
        domain_id: domain,
        kind,
        use_system_public_ips: None,
    }
}

pub fn network(
    id: NetworkId,
    zone: ZoneId,
    owner: AccountId,
    guest_type: GuestType,
    state: NetworkState,
    conserve_mode: bool,
) -> Network {
    Network {
        id,
        zone_id: zone,
        account_id: owner,
        vpc_id: None,
        state,
        guest_type,
        conserve_mode,
    }
}

pub fn vlan(zone: ZoneId, range: &str, dedication: Option<Dedication>) -> VlanRange {
    VlanRange {
        id: VlanId::new(),
        usage: VlanUsage::VirtualNetwork,
        ip_range: range.to_string(),
        network_id: None,
        physical_network_id: PHYSICAL_1,
        zone_id: zone,
        pod_id: None,
        dedication,
    }
}

pub fn user_actor(account: AccountId) -> Actor {
    Actor::new(cim_address_manager::domain::UserId::new(), account)
}

// ============================================================================
// Recording collaborators
// ============================================================================

/// Rule managers recording each revoke step, with per-step failure injection
#[derive(Debug, Default)]
pub struct RecordingRuleManagers {
    calls: Mutex<Vec<(&'static str, AddressId)>>,
    seeded: Mutex<Vec<AddressId>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingRuleManagers {
    pub const FIREWALL: &'static str = "firewall";
    pub const PORT_FORWARDING: &'static str = "port_forwarding";
    pub const LOAD_BALANCER: &'static str = "load_balancer";
    pub const VPN: &'static str = "vpn";

    pub fn fail_on(&self, step: &'static str) {
        self.failing.lock().unwrap().insert(step);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls_for(&self, address: AddressId) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, a)| *a == address)
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn seeded(&self) -> Vec<AddressId> {
        self.seeded.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str, address: AddressId) -> AddressResult<()> {
        self.calls.lock().unwrap().push((step, address));
        if self.failing.lock().unwrap().contains(step) {
            return Err(AddressError::ProviderUnavailable {
                provider: Provider::VIRTUAL_ROUTER,
                reason: format!("{} cleanup failed", step),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RuleManagers for RecordingRuleManagers {
    async fn revoke_firewall_rules(&self, address: AddressId, _actor: &Actor) -> AddressResult<()> {
        self.record(Self::FIREWALL, address)
    }

    async fn revoke_port_forwarding_and_static_nat(
        &self,
        address: AddressId,
        _actor: &Actor,
    ) -> AddressResult<()> {
        self.record(Self::PORT_FORWARDING, address)
    }

    async fn revoke_load_balancers(&self, address: AddressId, _actor: &Actor) -> AddressResult<()> {
        self.record(Self::LOAD_BALANCER, address)
    }

    async fn revoke_vpn(&self, address: AddressId, _actor: &Actor) -> AddressResult<()> {
        self.record(Self::VPN, address)
    }

    async fn seed_system_firewall_rules(&self, address: &AddressRecord) -> AddressResult<()> {
        self.seeded.lock().unwrap().push(address.id);
        Ok(())
    }
}

/// One `apply_ips` call as seen by a deployer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCall {
    pub network: NetworkId,
    pub addresses: Vec<(IpAddr, AddressState)>,
    pub services: BTreeSet<Service>,
}

/// IP deployer recording each batch; can be switched to fail
#[derive(Debug, Default)]
pub struct RecordingDeployer {
    calls: Mutex<Vec<DeployCall>>,
    failing: AtomicBool,
}

impl RecordingDeployer {
    pub fn calls(&self) -> Vec<DeployCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl IpDeployer for RecordingDeployer {
    async fn apply_ips(
        &self,
        network: &Network,
        addresses: &[AddressRecord],
        services: &BTreeSet<Service>,
    ) -> AddressResult<()> {
        self.calls.lock().unwrap().push(DeployCall {
            network: network.id,
            addresses: addresses.iter().map(|a| (a.address, a.state)).collect(),
            services: services.clone(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(AddressError::ProviderUnavailable {
                provider: Provider::VIRTUAL_ROUTER,
                reason: "router unreachable".into(),
            });
        }
        Ok(())
    }
}

/// Network element with an optional deployer
pub struct RecordingElement {
    pub provider: Provider,
    pub deployer: Option<Arc<RecordingDeployer>>,
}

impl NetworkElement for RecordingElement {
    fn provider(&self) -> Provider {
        self.provider.clone()
    }

    fn ip_deployer(&self, _network: &Network) -> Option<Arc<dyn IpDeployer>> {
        self.deployer
            .clone()
            .map(|d| d as Arc<dyn IpDeployer>)
    }
}

/// Rule and static NAT applier counting calls; can be switched to fail
#[derive(Debug, Default)]
pub struct RecordingApplier {
    pub calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingApplier {
    pub fn failing() -> Self {
        let applier = Self::default();
        applier.failing.store(true, Ordering::SeqCst);
        applier
    }

    fn outcome(&self) -> AddressResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AddressError::ProviderUnavailable {
                provider: Provider::VIRTUAL_ROUTER,
                reason: "rule push rejected".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkRuleApplier for RecordingApplier {
    async fn apply_rules(
        &self,
        _network: &Network,
        _purpose: RulePurpose,
        _rules: &[RuleRecord],
    ) -> AddressResult<()> {
        self.outcome()
    }
}

#[async_trait]
impl StaticNatApplier for RecordingApplier {
    async fn apply_static_nats(
        &self,
        _network: &Network,
        _rules: &[StaticNatRule],
    ) -> AddressResult<()> {
        self.outcome()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fully wired manager with recording collaborators
pub struct Harness {
    pub store: Arc<Datastore>,
    pub directory: Arc<StaticDirectory>,
    pub limits: Arc<InMemoryResourceLimits>,
    pub usage: Arc<RecordingUsageSink>,
    pub rule_managers: Arc<RecordingRuleManagers>,
    pub deployer: Arc<RecordingDeployer>,
    pub manager: Arc<AddressManager>,
}

/// Options for [`Harness::with`]
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub config: AddressManagerConfig,
    pub limit: Option<u64>,
    /// Register the router element without an IP deployer
    pub without_deployer: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        let mut config = AddressManagerConfig::default();
        config.lock_wait = std::time::Duration::from_millis(200);
        config.portable_lock_wait = std::time::Duration::from_millis(200);
        Self {
            config,
            limit: None,
            without_deployer: false,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with_limit(limit: u64) -> Self {
        Self::with(HarnessOptions {
            limit: Some(limit),
            ..HarnessOptions::default()
        })
    }

    pub fn with(options: HarnessOptions) -> Self {
        let store = Arc::new(Datastore::new(options.config.max_range_size));
        let directory = Arc::new(StaticDirectory::new());
        let limits = Arc::new(InMemoryResourceLimits::new(options.limit));
        let usage = Arc::new(RecordingUsageSink::default());
        let rule_managers = Arc::new(RecordingRuleManagers::default());
        let deployer = Arc::new(RecordingDeployer::default());

        directory
            .insert_account(account(ACCOUNT_A, DOMAIN_1, AccountKind::Normal))
            .unwrap();
        directory
            .insert_account(account(ACCOUNT_B, DOMAIN_2, AccountKind::Normal))
            .unwrap();
        directory
            .insert_account(account(Actor::SYSTEM_ACCOUNT, DOMAIN_1, AccountKind::System))
            .unwrap();

        let networks = [
            network(NETWORK_1, ZONE_1, ACCOUNT_A, GuestType::Isolated, NetworkState::Implemented, true),
            network(NETWORK_2, ZONE_1, ACCOUNT_A, GuestType::Isolated, NetworkState::Allocated, true),
            network(NETWORK_STRICT, ZONE_1, ACCOUNT_A, GuestType::Isolated, NetworkState::Implemented, false),
            network(NETWORK_SHARED, ZONE_1, Actor::SYSTEM_ACCOUNT, GuestType::Shared, NetworkState::Implemented, true),
            Network {
                vpc_id: Some(VPC_1),
                ..network(NETWORK_VPC, ZONE_1, ACCOUNT_A, GuestType::Isolated, NetworkState::Implemented, true)
            },
            network(NETWORK_ZONE_2, ZONE_2, ACCOUNT_A, GuestType::Isolated, NetworkState::Implemented, true),
            network(NETWORK_B, ZONE_1, ACCOUNT_B, GuestType::Isolated, NetworkState::Implemented, true),
            network(NETWORK_UNBOUND, ZONE_1, ACCOUNT_A, GuestType::Isolated, NetworkState::Implemented, true),
        ];

        let mut bindings = ProviderBindingTable::builder();
        for net in &networks {
            if net.id != NETWORK_UNBOUND {
                bindings = bindings.bind_all(net.id, ALL_SERVICES, Provider::VIRTUAL_ROUTER);
            }
        }
        for net in networks {
            directory.insert_network(net).unwrap();
        }

        let elements = ElementRegistry::new().register(Arc::new(RecordingElement {
            provider: Provider::VIRTUAL_ROUTER,
            deployer: if options.without_deployer {
                None
            } else {
                Some(deployer.clone())
            },
        }));

        let manager = AddressManager::builder()
            .config(options.config)
            .datastore(store.clone())
            .directory(directory.clone(), directory.clone())
            .limits(limits.clone())
            .usage_sink(usage.clone())
            .rule_managers(rule_managers.clone())
            .provider_bindings(bindings.build())
            .elements(elements)
            .build()
            .expect("harness manager");

        Self {
            store,
            directory,
            limits,
            usage,
            rule_managers,
            deployer,
            manager: Arc::new(manager),
        }
    }

    /// Provision a range and return its VLAN id
    pub fn provision(&self, range: VlanRange) -> VlanId {
        let id = range.id;
        self.store.provision_vlan(range).expect("provision vlan");
        id
    }

    pub fn provision_shared(&self, zone: ZoneId, range: &str) -> VlanId {
        self.provision(vlan(zone, range, None))
    }

    pub fn provision_portable(&self, address: &str) {
        self.store
            .provision_portable(PortableIpRecord::free(
                ip(address),
                ip("198.51.100.1"),
                "255.255.255.0",
            ))
            .expect("provision portable");
    }

    pub fn address(&self, id: AddressId) -> AddressRecord {
        self.store.address(id).expect("address exists")
    }

    pub fn address_at(&self, zone: ZoneId, address: &str) -> AddressRecord {
        self.store
            .find_by_ip(zone, ip(address))
            .expect("datastore readable")
            .expect("address exists")
    }
}
