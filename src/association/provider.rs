// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provider bindings and grouping
//!
//! [`ProviderBindingTable`] is the static (network, service) → provider map,
//! built once at startup and read-only afterwards. [`group_by_provider`]
//! splits a classification into one batch per provider.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, error};

use super::engine::Classification;
use crate::domain::{AddressRecord, Network, NetworkId, Provider, Service};
use crate::errors::{AddressError, AddressResult};
use crate::external::NetworkElement;

/// Immutable (network, service) → provider table
#[derive(Debug, Clone, Default)]
pub struct ProviderBindingTable {
    bindings: BTreeMap<(NetworkId, Service), Vec<Provider>>,
}

impl ProviderBindingTable {
    pub fn builder() -> ProviderBindingTableBuilder {
        ProviderBindingTableBuilder::default()
    }

    /// The provider bound to `service` on `network`
    ///
    /// More than one provider for the pair is a configuration defect.
    pub fn provider_for(
        &self,
        network: NetworkId,
        service: Service,
    ) -> AddressResult<Option<&Provider>> {
        match self.bindings.get(&(network, service)).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([provider]) => Ok(Some(provider)),
            Some(many) => Err(AddressError::InvariantViolation(format!(
                "service {} on network {} is bound to {} providers",
                service,
                network,
                many.len()
            ))),
        }
    }
}

/// Builder for [`ProviderBindingTable`]
#[derive(Debug, Default)]
pub struct ProviderBindingTableBuilder {
    bindings: BTreeMap<(NetworkId, Service), Vec<Provider>>,
}

impl ProviderBindingTableBuilder {
    pub fn bind(mut self, network: NetworkId, service: Service, provider: Provider) -> Self {
        let providers = self.bindings.entry((network, service)).or_default();
        if !providers.contains(&provider) {
            providers.push(provider);
        }
        self
    }

    /// Bind several services of one network to the same provider
    pub fn bind_all(
        self,
        network: NetworkId,
        services: impl IntoIterator<Item = Service>,
        provider: Provider,
    ) -> Self {
        services
            .into_iter()
            .fold(self, |builder, service| builder.bind(network, service, provider.clone()))
    }

    pub fn build(self) -> ProviderBindingTable {
        ProviderBindingTable {
            bindings: self.bindings,
        }
    }
}

/// Registered network elements, keyed by provider
#[derive(Clone, Default)]
pub struct ElementRegistry {
    elements: HashMap<Provider, Arc<dyn NetworkElement>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, element: Arc<dyn NetworkElement>) -> Self {
        self.elements.insert(element.provider(), element);
        self
    }

    pub fn element(&self, provider: &Provider) -> Option<&Arc<dyn NetworkElement>> {
        self.elements.get(provider)
    }
}

/// One provider's batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAssignment {
    pub provider: Provider,
    /// Source NAT addresses first
    pub addresses: Vec<AddressRecord>,
    pub services: BTreeSet<Service>,
}

/// Group classified addresses by the provider serving them
///
/// An address whose services are bound to several providers joins each of
/// their batches, carrying only the services that provider serves.
pub fn group_by_provider(
    network: &Network,
    classification: &Classification,
    bindings: &ProviderBindingTable,
) -> AddressResult<Vec<ProviderAssignment>> {
    let mut batches: BTreeMap<Provider, ProviderAssignment> = BTreeMap::new();

    for binding in &classification.bindings {
        if !network.conserve_mode && binding.non_firewall_count() > 1 {
            error!(address = %binding.address.address, services = ?binding.services, "multiple services outside conserve mode");
            return Err(AddressError::InvariantViolation(format!(
                "address {} carries {:?} but network {} is not in conserve mode",
                binding.address.address, binding.services, network.id
            )));
        }

        let mut per_provider: BTreeMap<&Provider, BTreeSet<Service>> = BTreeMap::new();
        for service in &binding.services {
            if let Some(provider) = bindings.provider_for(network.id, *service)? {
                per_provider.entry(provider).or_default().insert(*service);
            }
        }

        if per_provider.is_empty() {
            debug!(address = %binding.address.address, "no provider bound, skipped");
            continue;
        }

        for (provider, services) in per_provider {
            let batch = batches
                .entry(provider.clone())
                .or_insert_with(|| ProviderAssignment {
                    provider: provider.clone(),
                    addresses: Vec::new(),
                    services: BTreeSet::new(),
                });
            batch.addresses.push(binding.address.clone());
            batch.services.extend(services);
        }
    }

    Ok(batches
        .into_values()
        .map(|mut batch| {
            batch.addresses.sort_by_key(|a| !a.source_nat);
            batch
        })
        .collect())
}
