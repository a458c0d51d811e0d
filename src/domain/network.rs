// Copyright (c) 2025 - Cowboy AI, Inc.
//! Guest Networks, Accounts and Actors
//!
//! Metadata the address manager reads from the network catalog and the
//! account directory. None of it is owned here.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, DomainId, NetworkId, UserId, VpcId, ZoneId};

/// Guest network lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Allocated,
    /// Being brought up; every rule change must re-push addresses
    Implementing,
    Implemented,
    Shutdown,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkState::Allocated => "Allocated",
            NetworkState::Implementing => "Implementing",
            NetworkState::Implemented => "Implemented",
            NetworkState::Shutdown => "Shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Guest network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestType {
    Isolated,
    Shared,
}

/// Guest network as seen by the address manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub zone_id: ZoneId,
    pub account_id: AccountId,
    pub vpc_id: Option<VpcId>,
    pub state: NetworkState,
    pub guest_type: GuestType,
    /// Whether one address may carry several non-firewall services
    pub conserve_mode: bool,
}

impl Network {
    /// Network is live on its providers
    pub fn is_implemented(&self) -> bool {
        self.state == NetworkState::Implemented
    }

    /// Network is being brought up
    pub fn is_implementing(&self) -> bool {
        self.state == NetworkState::Implementing
    }

    pub fn is_shared(&self) -> bool {
        self.guest_type == GuestType::Shared
    }

    pub fn is_vpc_tier(&self) -> bool {
        self.vpc_id.is_some()
    }
}

/// Account kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Owner of system VMs and platform resources; never charged
    System,
    Normal,
}

/// Tenant account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub domain_id: DomainId,
    pub kind: AccountKind,
    /// Per-account override of the "fall back to shared system IPs" policy
    pub use_system_public_ips: Option<bool>,
}

impl Account {
    pub fn is_system(&self) -> bool {
        self.kind == AccountKind::System
    }

    /// Whether the account may fall back to the shared pool once its
    /// dedicated ranges are exhausted
    pub fn may_use_system_ips(&self, global_default: bool) -> bool {
        self.use_system_public_ips.unwrap_or(global_default)
    }
}

/// Caller on whose behalf an operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub account_id: AccountId,
}

impl Actor {
    /// Well-known system identity used for internal cleanup
    pub const SYSTEM_USER: UserId = UserId::from_uuid(uuid::Uuid::from_u128(1));
    pub const SYSTEM_ACCOUNT: AccountId = AccountId::from_uuid(uuid::Uuid::from_u128(1));

    pub fn new(user_id: UserId, account_id: AccountId) -> Self {
        Self {
            user_id,
            account_id,
        }
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM_USER, Self::SYSTEM_ACCOUNT)
    }

    pub fn is_system(&self) -> bool {
        self.account_id == Self::SYSTEM_ACCOUNT
    }
}
