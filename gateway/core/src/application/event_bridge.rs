// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration/Event Bridge Application Service
//!
//! Subscribes to the event bus and turns platform events into synchronizer
//! calls:
//!
//! | Event | Action |
//! |-------|--------|
//! | `Started` | read the domain list, reconcile block rules |
//! | `StoreChanged { key: "controlledSites" }` | read the domain list, reconcile block rules |
//! | `ContextClosed { context_id }` | revoke rules scoped to the context |
//!
//! Failures are logged and the bridge keeps running; the next trigger
//! converges the rule set again. When the list cannot be read the installed
//! rules are kept as they are.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::domain_list::DomainListManager;
use crate::application::synchronizer::GatewaySynchronizer;
use crate::domain::events::GatewayEvent;
use crate::domain::repository::CONTROLLED_SITES_KEY;
use crate::infrastructure::event_bus::{EventBus, EventBusError, EventReceiver};

pub struct EventBridge {
    receiver: EventReceiver,
    domains: DomainListManager,
    synchronizer: Arc<GatewaySynchronizer>,
}

impl EventBridge {
    /// Subscribes immediately, so events published after `new` returns are not missed.
    pub fn new(
        event_bus: &EventBus,
        domains: DomainListManager,
        synchronizer: Arc<GatewaySynchronizer>,
    ) -> Self {
        Self {
            receiver: event_bus.subscribe(),
            domains,
            synchronizer,
        }
    }

    /// Spawn the bridge loop. It ends when every publisher has been dropped.
    pub fn start(mut self) -> JoinHandle<()> {
        info!("Starting gateway event bridge");

        tokio::spawn(async move {
            loop {
                match self.receiver.recv().await {
                    Ok(event) => self.handle(event).await,
                    Err(EventBusError::Closed) => {
                        info!("Event bus closed, stopping gateway event bridge");
                        break;
                    }
                    Err(EventBusError::Lagged(n)) => {
                        // Missed events may include list changes; resynchronize.
                        warn!("Event bridge lagged by {} events, reconciling", n);
                        self.reconcile().await;
                    }
                }
            }
        })
    }

    /// Apply one event. Never fails; problems are logged.
    pub async fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Started { .. } => self.reconcile().await,
            GatewayEvent::StoreChanged { key, .. } if key == CONTROLLED_SITES_KEY => {
                self.reconcile().await
            }
            GatewayEvent::ContextClosed { context_id, .. } => {
                if let Err(e) = self.synchronizer.revoke_context_rules(context_id).await {
                    error!(context_id = %context_id, "Failed to revoke context rules: {}", e);
                }
            }
            other => debug!(event = ?other, "Event bridge ignoring event"),
        }
    }

    async fn reconcile(&self) {
        // An unreadable list must not be mistaken for an empty one.
        let domains = match self.domains.current().await {
            Ok(domains) => domains,
            Err(e) => {
                error!("Cannot read controlled domains, leaving installed rules in place: {}", e);
                return;
            }
        };
        match self.synchronizer.reconcile_block_rules(&domains).await {
            Ok(report) if !report.is_clean() => {
                for collision in &report.collisions {
                    warn!("Domain left unprotected: {}", collision);
                }
            }
            Ok(_) => {}
            Err(e) => error!(domains = domains.len(), "Failed to reconcile block rules: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::admin_authorization::AdminAuthorizationGate;
    use crate::domain::auth::{AuthResponse, Authenticator};
    use crate::domain::clock::SystemClock;
    use crate::domain::error::GatewayError;
    use crate::domain::repository::RuleStore;
    use crate::domain::rule::ContextId;
    use crate::infrastructure::kv_store::InMemoryKeyValueStore;
    use crate::infrastructure::rule_store::{InMemoryRuleStore, NavigationOutcome};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Refusing;

    #[async_trait]
    impl Authenticator for Refusing {
        async fn authenticate(&self, _domain: &str, _reason: &str) -> Result<AuthResponse, GatewayError> {
            Err(GatewayError::AuthDenied("not in this test".to_string()))
        }
    }

    fn bridge(kv: &InMemoryKeyValueStore, engine: &InMemoryRuleStore) -> (EventBridge, DomainListManager) {
        let bus = EventBus::new(16);
        let gate = Arc::new(AdminAuthorizationGate::new(
            Arc::new(Refusing),
            Duration::from_secs(60),
            Arc::new(SystemClock),
        ));
        let domains = DomainListManager::spawn(Arc::new(kv.clone()), gate);
        let synchronizer = Arc::new(GatewaySynchronizer::new(
            Arc::new(engine.clone()),
            "guardian://gate",
        ));
        (EventBridge::new(&bus, domains.clone(), synchronizer), domains)
    }

    #[tokio::test]
    async fn test_started_installs_block_rules() {
        let kv = InMemoryKeyValueStore::new();
        let engine = InMemoryRuleStore::default();
        let (bridge, domains) = bridge(&kv, &engine);

        domains.add("bank.com").await.unwrap();
        bridge.handle(GatewayEvent::started()).await;
        assert_eq!(engine.list_rules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_list_keeps_installed_rules() {
        let kv = InMemoryKeyValueStore::new();
        let engine = InMemoryRuleStore::default();
        let (bridge, domains) = bridge(&kv, &engine);

        domains.add("bank.com").await.unwrap();
        bridge.handle(GatewayEvent::started()).await;
        let updates = engine.update_count();

        kv.set_fail_reads(true);
        bridge.handle(GatewayEvent::started()).await;
        bridge
            .handle(GatewayEvent::store_changed(CONTROLLED_SITES_KEY))
            .await;

        assert_eq!(engine.update_count(), updates);
        assert!(matches!(
            engine.evaluate("https://bank.com/", ContextId(1)),
            NavigationOutcome::Redirected { .. }
        ));
    }
}
