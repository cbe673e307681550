// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod authenticator;
pub mod event_bus;
pub mod kv_store;
pub mod rule_store;

pub use event_bus::EventBus;
pub use kv_store::{FileKeyValueStore, InMemoryKeyValueStore};
pub use rule_store::{InMemoryRuleStore, NavigationOutcome};
