// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for address usage events
//!
//! # Subject Pattern
//!
//! ```text
//! {root}.{category}.{operation}
//! ```
//!
//! This allows for:
//! - Precise subscriptions (`ipam.public_ip.assigned`)
//! - Category-level wildcards (`ipam.portable_ip.>`)
//! - Global subscriptions (`ipam.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_address_manager::subjects::{SubjectBuilder, UsageCategory, UsageOperation};
//!
//! let subject = SubjectBuilder::new("ipam")
//!     .category(UsageCategory::PublicIp)
//!     .operation(UsageOperation::Released)
//!     .build();
//! assert_eq!(subject, "ipam.public_ip.released");
//!
//! let wildcard = SubjectBuilder::new("ipam")
//!     .category(UsageCategory::PortableIp)
//!     .build();
//! assert_eq!(wildcard, "ipam.portable_ip.>");
//! ```

use std::fmt;

/// Default root namespace for usage subjects
pub const DEFAULT_USAGE_ROOT: &str = "ipam";

/// Address category a usage event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageCategory {
    /// Zone-scoped public address
    PublicIp,
    /// Region-wide portable address
    PortableIp,
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageCategory::PublicIp => write!(f, "public_ip"),
            UsageCategory::PortableIp => write!(f, "portable_ip"),
        }
    }
}

/// What happened to the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageOperation {
    Assigned,
    Released,
    Transferred,
}

impl fmt::Display for UsageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageOperation::Assigned => write!(f, "assigned"),
            UsageOperation::Released => write!(f, "released"),
            UsageOperation::Transferred => write!(f, "transferred"),
        }
    }
}

/// Builder for usage NATS subjects
///
/// Missing trailing tokens become a `>` wildcard, so the builder never fails.
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    root: String,
    category: Option<UsageCategory>,
    operation: Option<UsageOperation>,
}

impl SubjectBuilder {
    /// Create a new subject builder under `root`
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            category: None,
            operation: None,
        }
    }

    /// Set the category
    pub fn category(mut self, category: UsageCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the operation
    pub fn operation(mut self, operation: UsageOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Build the subject string
    ///
    /// - both set: `{root}.{category}.{operation}`
    /// - category only: `{root}.{category}.>`
    /// - otherwise: `{root}.>`
    pub fn build(self) -> String {
        match (self.category, self.operation) {
            (Some(category), Some(operation)) => {
                format!("{}.{}.{}", self.root, category, operation)
            }
            (Some(category), None) => format!("{}.{}.>", self.root, category),
            (None, _) => format!("{}.>", self.root),
        }
    }
}

impl Default for SubjectBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_subject() {
        let subject = SubjectBuilder::default()
            .category(UsageCategory::PortableIp)
            .operation(UsageOperation::Transferred)
            .build();
        assert_eq!(subject, "ipam.portable_ip.transferred");
    }

    #[test]
    fn test_operation_without_category_is_global_wildcard() {
        let subject = SubjectBuilder::new("tenant-a.ipam")
            .operation(UsageOperation::Assigned)
            .build();
        assert_eq!(subject, "tenant-a.ipam.>");
    }
}
