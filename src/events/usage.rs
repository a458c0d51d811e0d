// Copyright (c) 2025 - Cowboy AI, Inc.
//! Usage Events
//!
//! Fire-and-forget facts about address ownership, consumed by billing and
//! auditing. They are produced after commit and never roll anything back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::{AccountId, AddressId, AddressRecord, NetworkId, VlanUsage, ZoneId};
use crate::subjects::{SubjectBuilder, UsageCategory, UsageOperation};

/// Kind of usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventKind {
    IpAssign,
    IpRelease,
    PortableIpAssign,
    PortableIpRelease,
    PortableIpTransfer,
}

impl UsageEventKind {
    pub fn category(self) -> UsageCategory {
        match self {
            UsageEventKind::IpAssign | UsageEventKind::IpRelease => UsageCategory::PublicIp,
            _ => UsageCategory::PortableIp,
        }
    }

    pub fn operation(self) -> UsageOperation {
        match self {
            UsageEventKind::IpAssign | UsageEventKind::PortableIpAssign => {
                UsageOperation::Assigned
            }
            UsageEventKind::IpRelease | UsageEventKind::PortableIpRelease => {
                UsageOperation::Released
            }
            UsageEventKind::PortableIpTransfer => UsageOperation::Transferred,
        }
    }

    /// Release kind matching whether the address is portable
    pub fn release_for(record: &AddressRecord) -> Self {
        if record.portable {
            UsageEventKind::PortableIpRelease
        } else {
            UsageEventKind::IpRelease
        }
    }

    /// Assign kind matching whether the address is portable
    pub fn assign_for(record: &AddressRecord) -> Self {
        if record.portable {
            UsageEventKind::PortableIpAssign
        } else {
            UsageEventKind::IpAssign
        }
    }
}

/// Address usage fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_id: Uuid,
    pub kind: UsageEventKind,
    pub account_id: AccountId,
    pub zone_id: ZoneId,
    pub address_id: AddressId,
    pub address: IpAddr,
    pub source_nat: bool,
    pub usage: VlanUsage,
    pub system: bool,
    /// Set on transfers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_network: Option<NetworkId>,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    /// Event describing `record` as it stands, charged to `account_id`
    pub fn for_record(
        kind: UsageEventKind,
        account_id: AccountId,
        record: &AddressRecord,
        usage: VlanUsage,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            kind,
            account_id,
            zone_id: record.zone_id,
            address_id: record.id,
            address: record.address,
            source_nat: record.source_nat,
            usage,
            system: record.system,
            target_network: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_target_network(mut self, network: NetworkId) -> Self {
        self.target_network = Some(network);
        self
    }

    /// NATS subject this event is published on
    pub fn subject(&self, root: &str) -> String {
        SubjectBuilder::new(root)
            .category(self.kind.category())
            .operation(self.kind.operation())
            .build()
    }
}
