// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-Process Redirect Engine
//!
//! Infrastructure implementation of [`RuleStore`] that behaves like a
//! browser's declarative session-rule engine: rules live in memory, updates
//! are validated and applied atomically, and navigations can be evaluated
//! against the installed set.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Hold installed rules and decide navigations
//! - **Pattern:** Adapter (Hexagonal Architecture)
//!
//! # Update semantics
//!
//! 1. Every id in `remove_ids` is removed (unknown ids are ignored).
//! 2. Every rule in `add_rules` is added; an id that is still installed, or
//!    repeated within the request, rejects the whole update.
//! 3. Patterns must compile and the result must fit the quota.
//!
//! # Evaluation
//!
//! Among rules whose pattern matches the URL and whose context scope admits
//! the navigation's context, the highest priority wins. At equal priority an
//! `allow` beats a `redirect`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::domain::error::GatewayError;
use crate::domain::repository::RuleStore;
use crate::domain::rule::{ContextId, Rule, RuleAction, RuleId};

#[derive(Clone)]
struct InstalledRule {
    rule: Rule,
    pattern: Regex,
}

/// What the engine does with one main-frame navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// No rule matched, or an allow rule won.
    Allowed { rule_id: Option<RuleId> },
    /// A redirect rule won; the browser goes to `target` instead.
    Redirected { rule_id: RuleId, target: String },
}

#[derive(Clone)]
pub struct InMemoryRuleStore {
    rules: Arc<RwLock<HashMap<RuleId, InstalledRule>>>,
    max_rules: usize,
    updates: Arc<AtomicUsize>,
}

impl InMemoryRuleStore {
    pub fn new(max_rules: usize) -> Self {
        Self {
            rules: Arc::new(RwLock::new(HashMap::new())),
            max_rules,
            updates: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of successful `apply_diff` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Decide a main-frame navigation to `url` in `context_id`.
    pub fn evaluate(&self, url: &str, context_id: ContextId) -> NavigationOutcome {
        let rules = self.rules.read();
        let winner = rules
            .values()
            .filter(|installed| installed.rule.applies_to(context_id))
            .filter(|installed| installed.pattern.is_match(url))
            .max_by_key(|installed| {
                (
                    installed.rule.priority,
                    installed.rule.is_allow(),
                    std::cmp::Reverse(installed.rule.id),
                )
            });

        match winner {
            None => NavigationOutcome::Allowed { rule_id: None },
            Some(installed) => match &installed.rule.action {
                RuleAction::Allow => NavigationOutcome::Allowed {
                    rule_id: Some(installed.rule.id),
                },
                RuleAction::Redirect { regex_substitution } => NavigationOutcome::Redirected {
                    rule_id: installed.rule.id,
                    target: regex_substitution.replace("\\0", url),
                },
            },
        }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new(5000)
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_rules(&self) -> Result<Vec<Rule>, GatewayError> {
        let rules = self.rules.read();
        let mut listed: Vec<Rule> = rules.values().map(|i| i.rule.clone()).collect();
        listed.sort_by_key(|r| r.id);
        Ok(listed)
    }

    async fn apply_diff(&self, remove_ids: &[RuleId], add_rules: &[Rule]) -> Result<(), GatewayError> {
        // Compile outside the lock; a bad pattern rejects the whole update.
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(add_rules.len());
        for rule in add_rules {
            if !seen.insert(rule.id) {
                return Err(GatewayError::RuleStore(format!(
                    "rule id {} appears twice in one update",
                    rule.id
                )));
            }
            let pattern = Regex::new(&rule.condition.regex_filter).map_err(|e| {
                GatewayError::RuleStore(format!("rule {} has an invalid regexFilter: {}", rule.id, e))
            })?;
            compiled.push(InstalledRule {
                rule: rule.clone(),
                pattern,
            });
        }

        let mut rules = self.rules.write();
        let mut next = rules.clone();
        for id in remove_ids {
            next.remove(id);
        }
        for installed in compiled {
            let id = installed.rule.id;
            if next.insert(id, installed).is_some() {
                return Err(GatewayError::RuleStore(format!(
                    "rule id {} is already installed",
                    id
                )));
            }
        }
        if next.len() > self.max_rules {
            return Err(GatewayError::RuleStore(format!(
                "update would install {} rules, quota is {}",
                next.len(),
                self.max_rules
            )));
        }

        debug!(
            removed = remove_ids.len(),
            added = add_rules.len(),
            total = next.len(),
            "Applied rule update"
        );
        *rules = next;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{ResourceType, RuleCondition, ALLOW_PRIORITY, BLOCK_PRIORITY};

    fn redirect(id: u32, pattern: &str) -> Rule {
        Rule {
            id: RuleId(id),
            priority: BLOCK_PRIORITY,
            action: RuleAction::Redirect {
                regex_substitution: "gate?targetUrl=\\0".to_string(),
            },
            condition: RuleCondition {
                regex_filter: pattern.to_string(),
                resource_types: vec![ResourceType::MainFrame],
                context_ids: None,
            },
        }
    }

    fn allow(id: u32, pattern: &str, context: u32) -> Rule {
        Rule {
            id: RuleId(id),
            priority: ALLOW_PRIORITY,
            action: RuleAction::Allow,
            condition: RuleCondition {
                regex_filter: pattern.to_string(),
                resource_types: vec![ResourceType::MainFrame],
                context_ids: Some(vec![ContextId(context)]),
            },
        }
    }

    #[tokio::test]
    async fn test_apply_and_list() {
        let store = InMemoryRuleStore::new(10);
        store
            .apply_diff(&[], &[redirect(2, "^a$"), redirect(1, "^b$")])
            .await
            .unwrap();

        let ids: Vec<_> = store.list_rules().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RuleId(1), RuleId(2)]);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_add_same_id_is_allowed() {
        let store = InMemoryRuleStore::new(10);
        store.apply_diff(&[], &[redirect(1, "^a$")]).await.unwrap();
        store
            .apply_diff(&[RuleId(1)], &[redirect(1, "^b$")])
            .await
            .unwrap();

        let rules = store.list_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition.regex_filter, "^b$");
    }

    #[tokio::test]
    async fn test_rejected_update_changes_nothing() {
        let store = InMemoryRuleStore::new(2);
        store.apply_diff(&[], &[redirect(1, "^a$")]).await.unwrap();

        let bad_pattern = store.apply_diff(&[RuleId(1)], &[redirect(2, "(")]).await;
        assert!(matches!(bad_pattern, Err(GatewayError::RuleStore(_))));

        let duplicate = store.apply_diff(&[], &[redirect(1, "^c$")]).await;
        assert!(matches!(duplicate, Err(GatewayError::RuleStore(_))));

        let twice = store
            .apply_diff(&[], &[redirect(5, "^c$"), redirect(5, "^d$")])
            .await;
        assert!(matches!(twice, Err(GatewayError::RuleStore(_))));

        let over_quota = store
            .apply_diff(&[], &[redirect(2, "^c$"), redirect(3, "^d$")])
            .await;
        assert!(matches!(over_quota, Err(GatewayError::RuleStore(_))));

        let rules = store.list_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition.regex_filter, "^a$");
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_prefers_scoped_allow() {
        let store = InMemoryRuleStore::new(10);
        let pattern = r"^https?://([^.]+\.)*bank\.com(/.*)?$";
        store
            .apply_diff(&[], &[redirect(1, pattern), allow(2, pattern, 42)])
            .await
            .unwrap();

        assert_eq!(
            store.evaluate("https://bank.com/x", ContextId(42)),
            NavigationOutcome::Allowed {
                rule_id: Some(RuleId(2))
            }
        );
        assert_eq!(
            store.evaluate("https://bank.com/x", ContextId(43)),
            NavigationOutcome::Redirected {
                rule_id: RuleId(1),
                target: "gate?targetUrl=https://bank.com/x".to_string()
            }
        );
        assert_eq!(
            store.evaluate("https://other.org/", ContextId(43)),
            NavigationOutcome::Allowed { rule_id: None }
        );
    }
}
