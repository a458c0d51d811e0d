// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Lease Uniqueness
//!
//! Any number of concurrent leases against a range of any size hands out
//! each address at most once. A lease that loses the race for a candidate
//! fails with a capacity error instead of retrying.

use std::collections::HashSet;

use futures::future::join_all;
use proptest::prelude::*;

use cim_address_manager::domain::{AddressState, VlanUsage};
use cim_address_manager::errors::AddressError;
use cim_address_manager::{AddressService, LeaseRequest};

use crate::common::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: concurrent leases never share an address
    #[test]
    fn prop_concurrent_leases_are_unique(size in 1u8..8, requests in 1usize..12) {
        let h = Harness::new();
        h.provision_shared(ZONE_1, &format!("203.0.113.1-203.0.113.{}", size));

        let results = tokio_test::block_on(join_all((0..requests).map(|i| {
            let manager = h.manager.clone();
            let owner = if i % 2 == 0 { ACCOUNT_A } else { ACCOUNT_B };
            async move {
                manager
                    .assign_public_ip(LeaseRequest::new(ZONE_1, owner, VlanUsage::VirtualNetwork))
                    .await
            }
        })));

        let mut seen = HashSet::new();
        let mut granted = 0usize;
        for result in results {
            match result {
                Ok(record) => {
                    prop_assert_eq!(record.state, AddressState::Allocated);
                    prop_assert!(seen.insert(record.address), "{} leased twice", record.address);
                    granted += 1;
                }
                Err(e) => prop_assert!(
                    matches!(e, AddressError::InsufficientCapacity { .. }),
                    "unexpected error {:?}",
                    e
                ),
            }
        }
        prop_assert!(granted >= 1);
        prop_assert!(granted <= requests.min(usize::from(size)));
    }

    /// Property: released addresses return to the pool
    #[test]
    fn prop_release_makes_address_leasable(size in 1u8..6) {
        let h = Harness::new();
        h.provision_shared(ZONE_1, &format!("203.0.113.1-203.0.113.{}", size));

        let total = tokio_test::block_on(async {
            let mut leased = Vec::new();
            while let Ok(record) = h.manager.allocate_ip(ACCOUNT_A, ZONE_1, true).await {
                leased.push(record);
            }
            for record in &leased {
                h.manager
                    .release(record.id, &user_actor(ACCOUNT_A))
                    .await
                    .expect("release");
            }
            let mut again = 0usize;
            while h.manager.allocate_ip(ACCOUNT_A, ZONE_1, true).await.is_ok() {
                again += 1;
            }
            (leased.len(), again)
        });

        prop_assert_eq!(total, (usize::from(size), usize::from(size)));
    }
}
