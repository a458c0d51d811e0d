// Copyright (c) 2025 - Cowboy AI, Inc.
//! Typed identifiers
//!
//! Every entity the address manager touches is keyed by a UUID wrapped in its
//! own newtype so that an account id can never be passed where a network id
//! is expected. New ids are UUID v7 (time ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh time-ordered id
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_id!(
    /// Tenant account
    AccountId
);
typed_id!(
    /// Account domain (tenant hierarchy node)
    DomainId
);
typed_id!(
    /// Availability zone
    ZoneId
);
typed_id!(
    /// Pod within a zone
    PodId
);
typed_id!(
    /// Provisioned VLAN address range
    VlanId
);
typed_id!(
    /// Physical network a VLAN range is carried on
    PhysicalNetworkId
);
typed_id!(
    /// Guest network
    NetworkId
);
typed_id!(
    /// Virtual private cloud
    VpcId
);
typed_id!(
    /// Virtual machine
    VmId
);
typed_id!(
    /// Leasable address record
    AddressId
);
typed_id!(
    /// Firewall / NAT / LB / VPN rule row
    RuleId
);
typed_id!(
    /// Region-scoped portable address
    PortableIpId
);
typed_id!(
    /// User acting on behalf of an account
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_and_ordered() {
        let a = AddressId::new();
        let b = AddressId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = VlanId::from_uuid(Uuid::from_u128(42));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", Uuid::from_u128(42)));

        let back: VlanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
