// Copyright (c) 2025 - Cowboy AI, Inc.
//! Post-commit Effects
//!
//! Lease and release paths never touch quota counters or the usage bus while
//! a transaction is open. They stage [`PendingEffect`]s as data on the
//! transaction, and once it commits the [`EffectExecutor`] performs them.
//!
//! ```text
//! Transaction                    Executor
//! ───────────                    ────────
//! defer(effect) ──┐
//! defer(effect) ──┤  commit()
//!                 └────────────> execute(effects)
//!                                  │
//!                                  ├─ ResourceLimits
//!                                  └─ UsageEventSink
//! ```
//!
//! A rolled-back transaction drops its effects. Failures while executing are
//! logged and never undo the committed state change.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::AccountId;
use crate::events::UsageEvent;
use crate::external::{ResourceLimits, UsageEventSink};

/// Side effect staged by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingEffect {
    /// Increment the account's public-IP counter
    ChargePublicIp(AccountId),
    /// Decrement the account's public-IP counter
    RefundPublicIp(AccountId),
    /// Emit a usage event
    Usage(UsageEvent),
}

/// Outcome of one [`EffectExecutor::execute`] batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EffectReport {
    pub applied: usize,
    pub failed: usize,
}

/// Performs committed effects against the quota and usage collaborators
#[derive(Clone)]
pub struct EffectExecutor {
    limits: Arc<dyn ResourceLimits>,
    usage: Arc<dyn UsageEventSink>,
}

impl EffectExecutor {
    pub fn new(limits: Arc<dyn ResourceLimits>, usage: Arc<dyn UsageEventSink>) -> Self {
        Self { limits, usage }
    }

    /// Execute effects in order; every effect runs even when an earlier one
    /// failed
    pub async fn execute(&self, effects: Vec<PendingEffect>) -> EffectReport {
        let mut report = EffectReport::default();

        for effect in effects {
            let result = match &effect {
                PendingEffect::ChargePublicIp(account) => self.limits.increment(*account).await,
                PendingEffect::RefundPublicIp(account) => self.limits.decrement(*account).await,
                PendingEffect::Usage(event) => self.usage.emit(event).await,
            };

            match result {
                Ok(()) => {
                    debug!(?effect, "effect applied");
                    report.applied += 1;
                }
                Err(e) => {
                    warn!(?effect, error = %e, "effect failed after commit");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
