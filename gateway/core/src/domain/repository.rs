// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Collaborator Interfaces
//!
//! Contracts for the two external systems the gateway persists into, defined
//! in the domain layer and implemented in [`crate::infrastructure`].
//!
//! | Trait | Backs | Implementations |
//! |-------|-------|----------------|
//! | `RuleStore` | declarative redirect engine | `InMemoryRuleStore` |
//! | `KeyValueStore` | synchronized settings mapping | `InMemoryKeyValueStore`, `FileKeyValueStore` |
//!
//! Both may be shared with other subsystems: the rule store holds foreign rules,
//! and the key-value store holds foreign keys.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::GatewayError;
use crate::domain::rule::{Rule, RuleId};

/// Key under which the controlled-domain list is stored.
pub const CONTROLLED_SITES_KEY: &str = "controlledSites";

/// Declarative redirect engine.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All installed rules, including ones the gateway does not own.
    async fn list_rules(&self) -> Result<Vec<Rule>, GatewayError>;

    /// Remove `remove_ids` then add `add_rules` as one update.
    ///
    /// Fails with [`GatewayError::RuleStore`] when the engine rejects a pattern,
    /// sees a duplicate id, or would exceed its quota. A failed update changes nothing.
    async fn apply_diff(&self, remove_ids: &[RuleId], add_rules: &[Rule]) -> Result<(), GatewayError>;
}

/// Eventually consistent key-value mapping. Change notification is delivered
/// separately as a `StoreChanged` event.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, GatewayError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), GatewayError>;
}
