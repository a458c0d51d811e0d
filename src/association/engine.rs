// Copyright (c) 2025 - Cowboy AI, Inc.
//! Association Engine
//!
//! Pure functions deriving, per address, the set of services a provider has
//! to carry for it, and deciding whether a rule change needs the providers to
//! be re-told about the network's addresses. All inputs are snapshots; the
//! only state touched is the caller's cloned [`AddressRecord`]s.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, error};

use crate::domain::{
    AddressId, AddressRecord, AddressState, Network, NetworkId, RulePurpose, RuleRecord,
    RuleState, Service, VpcId,
};
use crate::errors::{AddressError, AddressResult};
use crate::state_machine::address_lifecycle::AddressInput;
use crate::state_machine::StateMachine;

/// Rule rows per address, loaded once for a call
#[derive(Debug, Clone, Default)]
pub struct RuleEvidence {
    rows: HashMap<AddressId, Vec<(RulePurpose, RuleState)>>,
}

impl RuleEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one rule row
    pub fn add(&mut self, address: AddressId, purpose: RulePurpose, state: RuleState) {
        self.rows.entry(address).or_default().push((purpose, state));
    }

    /// Build from rule records; egress rules carry no address and are ignored
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a RuleRecord>) -> Self {
        let mut evidence = Self::new();
        for rule in rules {
            if let Some(address) = rule.source_address {
                evidence.add(address, rule.purpose, rule.state);
            }
        }
        evidence
    }

    fn rows(&self, address: AddressId) -> &[(RulePurpose, RuleState)] {
        self.rows.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self, address: AddressId) -> usize {
        self.rows(address).len()
    }

    pub fn count_in_state(&self, address: AddressId, state: RuleState) -> usize {
        self.rows(address).iter().filter(|(_, s)| *s == state).count()
    }

    fn purposes(&self, address: AddressId, accept: impl Fn(RuleState) -> bool) -> BTreeSet<RulePurpose> {
        self.rows(address)
            .iter()
            .filter(|(_, state)| accept(*state))
            .map(|(purpose, _)| *purpose)
            .collect()
    }
}

/// Address snapshot and the services it carries for this call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    pub address: AddressRecord,
    pub services: BTreeSet<Service>,
}

impl ServiceBinding {
    /// Services other than firewall
    pub fn non_firewall_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| **s != Service::Firewall)
            .count()
    }
}

/// Result of [`classify`]; never cached across calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub bindings: Vec<ServiceBinding>,
}

impl Classification {
    pub fn get(&self, address: AddressId) -> Option<&ServiceBinding> {
        self.bindings.iter().find(|b| b.address.id == address)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn services_for(purposes: &BTreeSet<RulePurpose>, include_firewall: bool) -> BTreeSet<Service> {
    purposes
        .iter()
        .filter(|p| include_firewall || **p != RulePurpose::Firewall)
        .map(|p| p.service())
        .collect()
}

/// Derive the active services of each address
///
/// `post_apply` is true when called after rules were programmed: rows in any
/// state but `Revoke` then count as live. Addresses whose services are only
/// visible through revoked rows are moved to `Releasing` on a post-apply call
/// (source NAT excepted) and reverted from `Releasing` to `Allocated` on a
/// pre-apply call.
pub fn classify(
    addresses: Vec<AddressRecord>,
    evidence: &RuleEvidence,
    post_apply: bool,
    include_firewall: bool,
) -> AddressResult<Classification> {
    let mut source_nat_seen: HashMap<(Option<NetworkId>, Option<VpcId>), AddressRecord> =
        HashMap::new();
    let mut bindings = Vec::with_capacity(addresses.len());

    for mut address in addresses {
        let mut services = BTreeSet::new();

        if address.source_nat {
            let key = (address.associated_network, address.vpc_id);
            if let Some(other) = source_nat_seen.get(&key) {
                error!(first = %other.address, second = %address.address, "two source NAT addresses on one network");
                return Err(AddressError::InvariantViolation(format!(
                    "network {:?} has two source NAT addresses: {} and {}",
                    key.0, other.address, address.address
                )));
            }
            source_nat_seen.insert(key, address.clone());
            services.insert(Service::SourceNat);
        }

        if address.state == AddressState::Allocating {
            bindings.push(ServiceBinding { address, services });
            continue;
        }

        let mut purposes = evidence.purposes(address.id, |state| {
            if post_apply {
                state != RuleState::Revoke
            } else {
                state == RuleState::Active
            }
        });
        if address.one_to_one_nat && address.associated_vm.is_some() {
            purposes.insert(RulePurpose::StaticNat);
        }
        let mut found = services_for(&purposes, include_firewall);

        if found.is_empty() {
            let mut revoked = evidence.purposes(address.id, |_| true);
            if address.one_to_one_nat {
                revoked.insert(RulePurpose::StaticNat);
            }
            found = services_for(&revoked, include_firewall);

            if found.is_empty() {
                if services.is_empty() {
                    debug!(address = %address.address, "no services, dropped from classification");
                } else {
                    bindings.push(ServiceBinding { address, services });
                }
                continue;
            }

            if post_apply && !address.source_nat {
                if let Ok((next, _)) = address.state.transition(&AddressInput::ProviderDissociate) {
                    debug!(address = %address.address, "last rule revoked, dissociating");
                    address.state = next;
                }
            } else if !post_apply && address.state == AddressState::Releasing {
                if let Ok((next, _)) = address.state.transition(&AddressInput::ProviderReassert) {
                    debug!(address = %address.address, "rules still present, keeping associated");
                    address.state = next;
                }
            }
        }

        services.extend(found);
        bindings.push(ServiceBinding { address, services });
    }

    Ok(Classification { bindings })
}

/// Whether a rule change on `network` requires re-pushing its addresses
pub fn needs_association(
    network: &Network,
    post_apply: bool,
    addresses: &[AddressRecord],
    evidence: &RuleEvidence,
) -> bool {
    if network.is_implementing() {
        return true;
    }

    for address in addresses {
        if address.source_nat || address.one_to_one_nat {
            continue;
        }

        let total = evidence.total(address.id);
        if total == 0 {
            continue;
        }

        if post_apply {
            if evidence.count_in_state(address.id, RuleState::Revoke) == total {
                return true;
            }
            continue;
        }

        let active = evidence.count_in_state(address.id, RuleState::Active);
        if active == 0 && evidence.count_in_state(address.id, RuleState::Add) == total {
            return true;
        }
        // VPC tiers re-assert addresses that are already live
        if network.is_vpc_tier() && active > 0 {
            return true;
        }
    }

    false
}

/// Whether a static NAT change on `network` requires re-pushing its addresses
pub fn needs_static_nat_association(
    network: &Network,
    post_apply: bool,
    for_revoke: bool,
    addresses: &[AddressRecord],
    evidence: &RuleEvidence,
) -> bool {
    if network.is_implementing() {
        return true;
    }

    addresses
        .iter()
        .filter(|a| a.one_to_one_nat)
        .any(|address| {
            if !post_apply && !for_revoke {
                evidence.count_in_state(address.id, RuleState::Active) == 0
            } else {
                post_apply && for_revoke
            }
        })
}
