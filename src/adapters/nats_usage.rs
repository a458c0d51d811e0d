// Copyright (c) 2025 - Cowboy AI, Inc.
//! Usage events on NATS
//!
//! Each [`UsageEvent`] is published as JSON on
//! `{root}.{public_ip|portable_ip}.{assigned|released|transferred}`.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AddressResult;
use crate::events::UsageEvent;
use crate::external::UsageEventSink;
use crate::nats::NatsClient;

/// [`UsageEventSink`] publishing through a [`NatsClient`]
#[derive(Clone)]
pub struct NatsUsageSink {
    client: NatsClient,
    root: String,
}

impl NatsUsageSink {
    pub fn new(client: NatsClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }
}

#[async_trait]
impl UsageEventSink for NatsUsageSink {
    async fn emit(&self, event: &UsageEvent) -> AddressResult<()> {
        let subject = event.subject(&self.root);
        self.client.publish(&subject, event).await?;
        debug!(%subject, kind = ?event.kind, address = %event.address, "usage event published");
        Ok(())
    }
}
