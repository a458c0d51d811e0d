// Copyright (c) 2025 - Cowboy AI, Inc.
//! Association Protocol
//!
//! Decides when the providers of a network have to be re-told about its
//! public addresses around rule programming, and tells them.
//!
//! ```text
//! snapshot addresses
//!      │
//!      ▼
//! needs_association(pre) ──yes──> reconcile(pre)
//!      │
//!      ▼
//! applier.apply_rules(...)        (failure deferred)
//!      │
//!      ▼
//! needs_association(post) ──yes─> reconcile(post)   (always attempted)
//!      │
//!      ▼
//! deferred failure, if any
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::engine::{classify, needs_association, needs_static_nat_association, RuleEvidence};
use super::provider::{group_by_provider, ElementRegistry, ProviderBindingTable};
use crate::datastore::Datastore;
use crate::domain::{AddressRecord, Network, RulePurpose, RuleRecord, StaticNatRule};
use crate::errors::{AddressError, AddressResult};
use crate::external::{NetworkCatalog, NetworkRuleApplier, RuleStateQuery, StaticNatApplier};

/// Pushes address associations to provider elements
#[derive(Clone)]
pub struct AssociationProtocol {
    store: Arc<Datastore>,
    rules: Arc<dyn RuleStateQuery>,
    networks: Arc<dyn NetworkCatalog>,
    bindings: Arc<ProviderBindingTable>,
    elements: ElementRegistry,
}

impl AssociationProtocol {
    pub fn new(
        store: Arc<Datastore>,
        rules: Arc<dyn RuleStateQuery>,
        networks: Arc<dyn NetworkCatalog>,
        bindings: Arc<ProviderBindingTable>,
        elements: ElementRegistry,
    ) -> Self {
        Self {
            store,
            rules,
            networks,
            bindings,
            elements,
        }
    }

    /// Load rule evidence for a set of addresses
    pub async fn load_evidence(&self, addresses: &[AddressRecord]) -> AddressResult<RuleEvidence> {
        let mut evidence = RuleEvidence::new();
        for address in addresses {
            for rule in self.rules.rules_for_address(address.id).await? {
                evidence.add(address.id, rule.purpose, rule.state);
            }
        }
        Ok(evidence)
    }

    /// Classify, group and push each provider its batch
    ///
    /// Returns `Ok(false)` when a provider failed and `continue_on_error`
    /// tolerated it. A missing element or IP deployer is never tolerated.
    pub async fn reconcile(
        &self,
        network: &Network,
        addresses: Vec<AddressRecord>,
        post_apply: bool,
        continue_on_error: bool,
    ) -> AddressResult<bool> {
        let evidence = self.load_evidence(&addresses).await?;
        let classification = classify(addresses, &evidence, post_apply, true)?;
        let batches = group_by_provider(network, &classification, &self.bindings)?;

        let mut success = true;
        for batch in batches {
            let element = self.elements.element(&batch.provider).ok_or_else(|| {
                AddressError::InvariantViolation(format!(
                    "no network element registered for provider {}",
                    batch.provider
                ))
            })?;
            let deployer = element.ip_deployer(network).ok_or_else(|| {
                AddressError::InvariantViolation(format!(
                    "provider {} has no IP deployer for network {}",
                    batch.provider, network.id
                ))
            })?;

            info!(
                network = %network.id,
                provider = %batch.provider,
                addresses = batch.addresses.len(),
                services = ?batch.services,
                post_apply,
                "applying ip associations"
            );

            if let Err(e) = deployer
                .apply_ips(network, &batch.addresses, &batch.services)
                .await
            {
                let err = match e {
                    AddressError::ProviderUnavailable { .. } => e,
                    other => AddressError::ProviderUnavailable {
                        provider: batch.provider.clone(),
                        reason: other.to_string(),
                    },
                };
                if continue_on_error {
                    warn!(provider = %batch.provider, error = %err, "ip association failed, continuing");
                    success = false;
                } else {
                    return Err(err);
                }
            }
        }

        Ok(success)
    }

    /// Program network rules of one purpose with association before and after
    pub async fn apply_rules(
        &self,
        rules: &[RuleRecord],
        purpose: RulePurpose,
        applier: &dyn NetworkRuleApplier,
        continue_on_error: bool,
    ) -> AddressResult<bool> {
        let Some(first) = rules.first() else {
            debug!(%purpose, "no rules to apply");
            return Ok(true);
        };
        let network = self.networks.network(first.network_id).await?;

        let addresses = if rules.iter().all(RuleRecord::is_egress_firewall) {
            Vec::new()
        } else {
            self.store.list_by_network(network.id)?
        };

        let mut success = true;

        if !addresses.is_empty() {
            let evidence = self.load_evidence(&addresses).await?;
            if needs_association(&network, false, &addresses, &evidence) {
                success &= self
                    .reconcile(&network, addresses.clone(), false, continue_on_error)
                    .await?;
            }
        }

        let deferred = self
            .run_applier(
                applier.apply_rules(&network, purpose, rules).await,
                continue_on_error,
                &mut success,
            );

        self.post_apply(
            &network,
            addresses,
            continue_on_error,
            deferred,
            success,
            |addresses, evidence| needs_association(&network, true, addresses, evidence),
        )
        .await
    }

    /// Program static NAT rules with association before and after
    pub async fn apply_static_nats(
        &self,
        rules: &[StaticNatRule],
        applier: &dyn StaticNatApplier,
        continue_on_error: bool,
        for_revoke: bool,
    ) -> AddressResult<bool> {
        let Some(first) = rules.first() else {
            return Ok(true);
        };
        let network = self.networks.network(first.network_id).await?;
        let mut addresses = self.store.list_by_network(network.id)?;

        let mut success = true;

        if !addresses.is_empty() {
            let evidence = self.load_evidence(&addresses).await?;
            if needs_static_nat_association(&network, false, for_revoke, &addresses, &evidence) {
                success &= self
                    .reconcile(&network, addresses.clone(), false, continue_on_error)
                    .await?;
            }
        }

        let deferred = self.run_applier(
            applier.apply_static_nats(&network, rules).await,
            continue_on_error,
            &mut success,
        );

        for rule in rules.iter().filter(|r| r.for_revoke) {
            if let Some(address) = addresses.iter_mut().find(|a| a.id == rule.source_address) {
                address.associated_vm = None;
            }
        }

        self.post_apply(
            &network,
            addresses,
            continue_on_error,
            deferred,
            success,
            |addresses, evidence| {
                needs_static_nat_association(&network, true, for_revoke, addresses, evidence)
            },
        )
        .await
    }

    fn run_applier(
        &self,
        result: AddressResult<()>,
        continue_on_error: bool,
        success: &mut bool,
    ) -> Option<AddressError> {
        match result {
            Ok(()) => None,
            Err(e) if continue_on_error && e.is_provider_failure() => {
                warn!(error = %e, "rule application failed, continuing");
                *success = false;
                None
            }
            Err(e) => {
                warn!(error = %e, "rule application failed");
                Some(e)
            }
        }
    }

    async fn post_apply<F>(
        &self,
        network: &Network,
        addresses: Vec<AddressRecord>,
        continue_on_error: bool,
        deferred: Option<AddressError>,
        mut success: bool,
        needed: F,
    ) -> AddressResult<bool>
    where
        F: Fn(&[AddressRecord], &RuleEvidence) -> bool,
    {
        let mut deferred = deferred;

        if !addresses.is_empty() {
            let reconciled = match self.load_evidence(&addresses).await {
                Ok(evidence) if needed(&addresses, &evidence) => {
                    self.reconcile(network, addresses, true, continue_on_error)
                        .await
                }
                Ok(_) => Ok(true),
                Err(e) => Err(e),
            };
            match reconciled {
                Ok(ok) => success &= ok,
                Err(e) if deferred.is_none() => deferred = Some(e),
                Err(e) => warn!(error = %e, "post-apply association failed after an earlier failure"),
            }
        }

        match deferred {
            Some(e) => Err(e),
            None => Ok(success),
        }
    }
}
