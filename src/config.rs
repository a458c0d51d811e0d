// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address manager configuration
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `IPAM_SYSTEM_VM_IP_STRICT` | `system_vm_ip_reservation_strict` | `false` |
//! | `IPAM_USE_SYSTEM_PUBLIC_IPS` | `use_system_public_ips` | `true` |
//! | `IPAM_LOCK_WAIT_SECS` | `lock_wait` | 120 s |
//! | `IPAM_PORTABLE_LOCK_WAIT_SECS` | `portable_lock_wait` | 5 s |
//! | `IPAM_MAX_RANGE_SIZE` | `max_range_size` | 65536 |
//! | `IPAM_USAGE_SUBJECT_ROOT` | `usage_subject_root` | `ipam` |

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{AddressError, AddressResult};
use crate::subjects::DEFAULT_USAGE_ROOT;

/// Tunables for leasing and locking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressManagerConfig {
    /// Addresses reserved for system VMs are excluded from other leases
    /// (and only they are offered to system VMs) instead of merely sorted
    pub system_vm_ip_reservation_strict: bool,
    /// Accounts with dedicated ranges may fall back to the shared pool
    pub use_system_public_ips: bool,
    /// Bounded wait for account and row locks
    pub lock_wait: Duration,
    /// Bounded wait for the portable pool lock
    pub portable_lock_wait: Duration,
    /// Largest VLAN range expanded into address records
    pub max_range_size: u128,
    /// NATS subject root for usage events
    pub usage_subject_root: String,
}

impl Default for AddressManagerConfig {
    fn default() -> Self {
        Self {
            system_vm_ip_reservation_strict: false,
            use_system_public_ips: true,
            lock_wait: Duration::from_secs(120),
            portable_lock_wait: Duration::from_secs(5),
            max_range_size: 65_536,
            usage_subject_root: DEFAULT_USAGE_ROOT.to_string(),
        }
    }
}

impl AddressManagerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> AddressResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            system_vm_ip_reservation_strict: env_or(
                "IPAM_SYSTEM_VM_IP_STRICT",
                defaults.system_vm_ip_reservation_strict,
            )?,
            use_system_public_ips: env_or(
                "IPAM_USE_SYSTEM_PUBLIC_IPS",
                defaults.use_system_public_ips,
            )?,
            lock_wait: env_or("IPAM_LOCK_WAIT_SECS", defaults.lock_wait.as_secs())
                .map(Duration::from_secs)?,
            portable_lock_wait: env_or(
                "IPAM_PORTABLE_LOCK_WAIT_SECS",
                defaults.portable_lock_wait.as_secs(),
            )
            .map(Duration::from_secs)?,
            max_range_size: env_or("IPAM_MAX_RANGE_SIZE", defaults.max_range_size)?,
            usage_subject_root: std::env::var("IPAM_USAGE_SUBJECT_ROOT")
                .unwrap_or(defaults.usage_subject_root),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> AddressResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AddressError::Configuration(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
