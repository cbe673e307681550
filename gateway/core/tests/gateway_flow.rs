// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end flows through the message router, event bridge and in-process engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use site_guardian_core::application::{
    AdminAuthorizationGate, DomainListManager, EventBridge, GatewaySynchronizer, MessageRouter,
};
use site_guardian_core::auth::{AuthResponse, Authenticator};
use site_guardian_core::clock::ManualClock;
use site_guardian_core::error::GatewayError;
use site_guardian_core::events::GatewayEvent;
use site_guardian_core::infrastructure::event_bus::EventReceiver;
use site_guardian_core::infrastructure::{EventBus, InMemoryKeyValueStore, InMemoryRuleStore};
use site_guardian_core::repository::{KeyValueStore, RuleStore};
use site_guardian_core::rule::{ContextId, ResourceType, Rule, RuleAction, RuleCondition, RuleId};

const GATE: &str = "guardian://gate";

/// Grants every domain except the ones listed in `refuse`.
struct ScriptedAuthenticator {
    refuse: Vec<&'static str>,
    prompts: AtomicUsize,
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn authenticate(&self, domain: &str, _reason: &str) -> Result<AuthResponse, GatewayError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.contains(&domain) {
            Err(GatewayError::AuthDenied("User canceled".to_string()))
        } else {
            Ok(AuthResponse::granted(domain))
        }
    }
}

struct Harness {
    bus: EventBus,
    events: EventReceiver,
    kv: InMemoryKeyValueStore,
    engine: InMemoryRuleStore,
    authenticator: Arc<ScriptedAuthenticator>,
    clock: Arc<ManualClock>,
    router: MessageRouter,
}

fn harness(refuse: Vec<&'static str>) -> Harness {
    let bus = EventBus::new(64);
    let events = bus.subscribe();
    let kv = InMemoryKeyValueStore::with_event_bus(bus.clone());
    let engine = InMemoryRuleStore::default();
    let authenticator = Arc::new(ScriptedAuthenticator {
        refuse,
        prompts: AtomicUsize::new(0),
    });
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let synchronizer = Arc::new(
        GatewaySynchronizer::new(Arc::new(engine.clone()), GATE).with_event_bus(bus.clone()),
    );
    let gate = Arc::new(AdminAuthorizationGate::new(
        authenticator.clone(),
        Duration::from_secs(60),
        clock.clone(),
    ));
    let domains = DomainListManager::spawn(Arc::new(kv.clone()), gate);

    EventBridge::new(&bus, domains.clone(), synchronizer.clone()).start();
    let router = MessageRouter::new(domains, synchronizer, authenticator.clone())
        .with_engine(engine.clone());

    Harness {
        bus,
        events,
        kv,
        engine,
        authenticator,
        clock,
        router,
    }
}

impl Harness {
    async fn call(&self, request: Value) -> Value {
        self.router.handle_json(&request.to_string()).await
    }

    /// Wait until an event matching `wanted` is published.
    async fn wait_for(&mut self, wanted: impl Fn(&GatewayEvent) -> bool) -> GatewayEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event bus open");
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("expected event was not published")
    }

    async fn reconciled(&mut self) {
        self.wait_for(|e| matches!(e, GatewayEvent::RulesReconciled { .. }))
            .await;
    }

    async fn navigate(&self, url: &str, context_id: i64) -> Value {
        self.call(json!({"action": "navigate", "url": url, "contextId": context_id}))
            .await
    }
}

#[tokio::test]
async fn test_challenge_flow_grants_only_the_authenticated_context() {
    let mut h = harness(vec![]);

    let added = h.call(json!({"action": "addControlledSite", "domain": "bank.com"})).await;
    assert_eq!(added, json!({"success": true, "sites": ["bank.com"]}));
    h.reconciled().await;

    let blocked = h.navigate("https://secure.bank.com/login", 42).await;
    assert_eq!(blocked["outcome"], "redirected");
    assert_eq!(
        blocked["target"],
        "guardian://gate?targetUrl=https://secure.bank.com/login&domain=bank.com"
    );

    let auth = h
        .call(json!({"action": "authenticate", "domain": "bank.com", "contextId": 42}))
        .await;
    assert_eq!(auth["success"], true);
    assert_eq!(auth["ruleId"], 1_999_957_263u32);

    assert_eq!(h.navigate("https://secure.bank.com/login", 42).await["outcome"], "allowed");
    assert_eq!(h.navigate("https://secure.bank.com/login", 43).await["outcome"], "redirected");
    assert_eq!(h.navigate("https://example.org/", 43).await["outcome"], "allowed");

    h.bus.publish(GatewayEvent::context_closed(ContextId(42)));
    h.wait_for(|e| matches!(e, GatewayEvent::ContextRevoked { rules_removed: 1, .. }))
        .await;
    assert_eq!(h.navigate("https://secure.bank.com/login", 42).await["outcome"], "redirected");
}

#[tokio::test]
async fn test_refused_authentication_installs_nothing() {
    let mut h = harness(vec!["bank.com"]);
    h.call(json!({"action": "addControlledSite", "domain": "bank.com"})).await;
    h.reconciled().await;

    let auth = h
        .call(json!({"action": "authenticate", "domain": "bank.com", "contextId": 42}))
        .await;
    assert_eq!(auth, json!({"success": false, "error": "Authentication denied: User canceled"}));
    assert_eq!(h.engine.len(), 1);
    assert_eq!(h.navigate("https://bank.com/", 42).await["outcome"], "redirected");
}

#[tokio::test]
async fn test_removing_a_site_prompts_once_per_window() {
    let mut h = harness(vec![]);
    for site in ["a.com", "b.com", "c.com"] {
        h.call(json!({"action": "addControlledSite", "domain": site})).await;
        h.reconciled().await;
    }
    assert_eq!(h.engine.len(), 3);

    let removed = h.call(json!({"action": "removeControlledSite", "domain": "a.com"})).await;
    assert_eq!(removed["sites"], json!(["b.com", "c.com"]));
    h.reconciled().await;

    h.clock.advance(chrono::Duration::seconds(30));
    h.call(json!({"action": "removeControlledSite", "domain": "b.com"})).await;
    h.reconciled().await;
    assert_eq!(h.authenticator.prompts.load(Ordering::SeqCst), 1);

    h.clock.advance(chrono::Duration::seconds(31));
    let cached_only = h
        .call(json!({"action": "removeControlledSite", "domain": "c.com", "allowPrompt": false}))
        .await;
    assert_eq!(cached_only["success"], false);
    assert!(cached_only["error"].as_str().unwrap().contains("Authorization required"));

    h.call(json!({"action": "removeControlledSite", "domain": "c.com"})).await;
    h.reconciled().await;
    assert_eq!(h.authenticator.prompts.load(Ordering::SeqCst), 2);
    assert!(h.engine.is_empty());
}

#[tokio::test]
async fn test_foreign_rules_survive_reconciliation_and_revocation() {
    let mut h = harness(vec![]);
    let foreign = |id: u32, contexts: Option<Vec<ContextId>>| Rule {
        id: RuleId(id),
        priority: 5,
        action: RuleAction::Allow,
        condition: RuleCondition {
            regex_filter: "^https://intranet/".to_string(),
            resource_types: vec![ResourceType::MainFrame],
            context_ids: contexts,
        },
    };
    h.engine
        .apply_diff(&[], &[foreign(7, None), foreign(950_000, Some(vec![ContextId(42)]))])
        .await
        .unwrap();

    h.call(json!({"action": "addControlledSite", "domain": "a.com"})).await;
    h.reconciled().await;
    h.call(json!({"action": "grantContextAccess", "domain": "a.com", "contextId": 42})).await;
    h.call(json!({"action": "removeControlledSite", "domain": "a.com"})).await;
    h.reconciled().await;

    let closed = h.call(json!({"action": "contextClosed", "contextId": 42})).await;
    assert_eq!(closed, json!({"success": true, "rulesRemoved": 1}));

    let ids: Vec<RuleId> = h.engine.list_rules().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![RuleId(7), RuleId(950_000)]);
}

#[tokio::test]
async fn test_started_event_reconciles_persisted_list() {
    let mut h = harness(vec![]);
    h.kv.set("controlledSites", json!(["a.com", "b.com"])).await.unwrap();
    h.reconciled().await;

    h.bus.publish(GatewayEvent::started());
    match h
        .wait_for(|e| matches!(e, GatewayEvent::RulesReconciled { .. }))
        .await
    {
        GatewayEvent::RulesReconciled { installed, .. } => assert_eq!(installed, 0),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.engine.len(), 2);
}

#[tokio::test]
async fn test_router_reports_malformed_requests() {
    let h = harness(vec![]);
    assert_eq!(h.router.handle_json("{oops").await["success"], false);
    assert_eq!(
        h.router.handle_json(r#"{"domain":"a.com"}"#).await,
        json!({"success": false, "error": "missing action field"})
    );
    assert_eq!(h.router.handle_json(r#"{"action":"reboot"}"#).await["success"], false);
    assert_eq!(
        h.call(json!({"action": "grantContextAccess", "domain": "bank.com", "contextId": -1}))
            .await,
        json!({"success": false, "error": "Invalid context id: -1"})
    );
}
