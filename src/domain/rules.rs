// Copyright (c) 2025 - Cowboy AI, Inc.
//! Rules, Services and Providers
//!
//! Rule rows are the evidence the association engine derives active services
//! from. A rule's [`RulePurpose`] maps to exactly one [`Service`]; a service
//! on a network maps to exactly one [`Provider`].

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;

use super::ids::{AddressId, NetworkId, RuleId, VmId};

/// What a rule row configures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePurpose {
    Firewall,
    PortForwarding,
    LoadBalancing,
    Vpn,
    StaticNat,
}

impl RulePurpose {
    /// Service a rule of this purpose is delivered by
    pub const fn service(self) -> Service {
        match self {
            RulePurpose::Firewall => Service::Firewall,
            RulePurpose::PortForwarding => Service::PortForwarding,
            RulePurpose::LoadBalancing => Service::Lb,
            RulePurpose::Vpn => Service::Vpn,
            RulePurpose::StaticNat => Service::StaticNat,
        }
    }

    pub const ALL: [RulePurpose; 5] = [
        RulePurpose::Firewall,
        RulePurpose::PortForwarding,
        RulePurpose::LoadBalancing,
        RulePurpose::Vpn,
        RulePurpose::StaticNat,
    ];
}

impl fmt::Display for RulePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RulePurpose::Firewall => "Firewall",
            RulePurpose::PortForwarding => "PortForwarding",
            RulePurpose::LoadBalancing => "LoadBalancing",
            RulePurpose::Vpn => "Vpn",
            RulePurpose::StaticNat => "StaticNat",
        };
        write!(f, "{}", s)
    }
}

/// Rule row state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    Staged,
    /// Requested, not yet programmed
    Add,
    /// Programmed on the provider
    Active,
    /// Marked for removal
    Revoke,
}

/// Direction of a firewall rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    Ingress,
    Egress,
}

/// Firewall / NAT / LB / VPN rule row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: RuleId,
    /// Public address the rule is attached to; egress rules have none
    pub source_address: Option<AddressId>,
    pub network_id: NetworkId,
    pub purpose: RulePurpose,
    pub state: RuleState,
    pub traffic_type: TrafficType,
}

impl RuleRecord {
    pub fn new(
        source_address: Option<AddressId>,
        network_id: NetworkId,
        purpose: RulePurpose,
        state: RuleState,
    ) -> Self {
        Self {
            id: RuleId::new(),
            source_address,
            network_id,
            purpose,
            state,
            traffic_type: TrafficType::Ingress,
        }
    }

    pub fn egress(network_id: NetworkId, state: RuleState) -> Self {
        Self {
            traffic_type: TrafficType::Egress,
            ..Self::new(None, network_id, RulePurpose::Firewall, state)
        }
    }

    pub fn is_egress_firewall(&self) -> bool {
        self.purpose == RulePurpose::Firewall && self.traffic_type == TrafficType::Egress
    }
}

/// One-to-one NAT between a public address and a VM's private address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticNatRule {
    pub source_address: AddressId,
    pub network_id: NetworkId,
    pub vm_id: VmId,
    pub vm_private_ip: IpAddr,
    pub for_revoke: bool,
}

/// Network service an address can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    SourceNat,
    StaticNat,
    Lb,
    PortForwarding,
    Vpn,
    Firewall,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Service::SourceNat => "SourceNat",
            Service::StaticNat => "StaticNat",
            Service::Lb => "Lb",
            Service::PortForwarding => "PortForwarding",
            Service::Vpn => "Vpn",
            Service::Firewall => "Firewall",
        };
        write!(f, "{}", s)
    }
}

/// Named network element able to program a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Provider(Cow<'static, str>);

impl Provider {
    pub const VIRTUAL_ROUTER: Provider = Provider(Cow::Borrowed("VirtualRouter"));
    pub const VPC_VIRTUAL_ROUTER: Provider = Provider(Cow::Borrowed("VpcVirtualRouter"));
    pub const NETSCALER: Provider = Provider(Cow::Borrowed("Netscaler"));
    pub const JUNIPER_SRX: Provider = Provider(Cow::Borrowed("JuniperSRX"));

    pub fn new(name: impl Into<String>) -> Self {
        Provider(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RulePurpose::Firewall, Service::Firewall)]
    #[test_case(RulePurpose::PortForwarding, Service::PortForwarding)]
    #[test_case(RulePurpose::LoadBalancing, Service::Lb)]
    #[test_case(RulePurpose::Vpn, Service::Vpn)]
    #[test_case(RulePurpose::StaticNat, Service::StaticNat)]
    fn test_purpose_service_table(purpose: RulePurpose, service: Service) {
        assert_eq!(purpose.service(), service);
    }

    #[test]
    fn test_provider_equality_ignores_ownership() {
        assert_eq!(Provider::new("VirtualRouter"), Provider::VIRTUAL_ROUTER);
        assert_ne!(Provider::NETSCALER, Provider::VIRTUAL_ROUTER);
    }

    #[test]
    fn test_egress_rule() {
        let rule = RuleRecord::egress(NetworkId::new(), RuleState::Add);
        assert!(rule.is_egress_firewall());
        assert!(rule.source_address.is_none());
    }
}
