// Copyright (c) 2025 - Cowboy AI, Inc.
//! Usage Event Tail
//!
//! Subscribes to every address usage event on NATS and logs it.
//!
//! Run with: cargo run --bin ipam-usage-tail
//!
//! Environment:
//! - `NATS_URL` (default: nats://localhost:4222)
//! - `IPAM_USAGE_SUBJECT_ROOT` (default: ipam)
//! - `RUST_LOG` (default: info)

use anyhow::{Context, Result};
use cim_address_manager::{
    subjects::SubjectBuilder, AddressManagerConfig, NatsClient, NatsConfig, UsageEvent,
};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting usage event tail");

    let config = AddressManagerConfig::from_env().context("Invalid address manager config")?;
    let nats = NatsConfig::from_env();
    info!("  - NATS servers: {:?}", nats.servers);
    info!("  - Subject root: {}", config.usage_subject_root);

    let client = NatsClient::new(nats)
        .await
        .context("Failed to connect to NATS")?;

    let subject = SubjectBuilder::new(config.usage_subject_root.clone()).build();
    let mut subscriber = client
        .subscribe(&subject)
        .await
        .with_context(|| format!("Failed to subscribe to {}", subject))?;

    let mut event_count = 0u64;
    let mut error_count = 0u64;

    while let Some(message) = subscriber.next().await {
        debug!("Received message on {}", message.subject);

        match serde_json::from_slice::<UsageEvent>(&message.payload) {
            Ok(event) => {
                event_count += 1;
                info!(
                    kind = ?event.kind,
                    account = %event.account_id,
                    zone = %event.zone_id,
                    address = %event.address,
                    source_nat = event.source_nat,
                    target_network = ?event.target_network,
                    "usage event"
                );
            }
            Err(e) => {
                error_count += 1;
                error!(
                    "Failed to parse usage event on {}: {} (total errors: {})",
                    message.subject, e, error_count
                );
            }
        }

        if (event_count + error_count) % 100 == 0 {
            info!(
                "Statistics: {} events seen, {} errors",
                event_count, error_count
            );
        }
    }

    warn!("Subscription ended");
    Ok(())
}
