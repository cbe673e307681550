// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod admin_authorization;
pub mod domain_list;
pub mod event_bridge;
pub mod message_router;
pub mod synchronizer;

// Re-export services for convenience
pub use admin_authorization::AdminAuthorizationGate;
pub use domain_list::{AuthorizationMode, DomainListManager};
pub use event_bridge::EventBridge;
pub use message_router::{GatewayRequest, MessageRouter};
pub use synchronizer::{GatewaySynchronizer, ReconcileReport};
