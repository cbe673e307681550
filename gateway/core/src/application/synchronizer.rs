// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Gateway Synchronizer Application Service
//!
//! Keeps the redirect engine consistent with the controlled-domain list and
//! with per-context grants:
//! - one low-priority block rule per controlled domain
//! - one high-priority allow rule per (domain, context) that authenticated
//! - allow rules scoped to a context disappear when the context closes
//!
//! Only ids inside the owned ranges of [`crate::domain::rule_codec`] are ever
//! removed; foreign rules sharing the engine are left alone.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrate rule derivation and the rule store adapter
//! - **Integration:** RuleStore → EventBus (`RulesReconciled`, `AccessGranted`, `ContextRevoked`)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::controlled_domain::ControlledDomain;
use crate::domain::error::GatewayError;
use crate::domain::events::GatewayEvent;
use crate::domain::gateway_config::ReconcileStrategy;
use crate::domain::repository::RuleStore;
use crate::domain::rule::{ContextId, Rule, RuleId};
use crate::domain::rule_codec::{allow_rule, block_rule, is_owned_block_id, is_owned_id};
use crate::infrastructure::event_bus::EventBus;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub installed: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Domains left without a block rule because an earlier domain holds their id.
    #[serde(serialize_with = "serialize_errors")]
    pub collisions: Vec<GatewayError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.collisions.is_empty()
    }
}

fn serialize_errors<S: serde::Serializer>(
    errors: &[GatewayError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

pub struct GatewaySynchronizer {
    rule_store: Arc<dyn RuleStore>,
    challenge_page: String,
    strategy: ReconcileStrategy,
    event_bus: Option<EventBus>,
}

impl GatewaySynchronizer {
    pub fn new(rule_store: Arc<dyn RuleStore>, challenge_page: impl Into<String>) -> Self {
        Self {
            rule_store,
            challenge_page: challenge_page.into(),
            strategy: ReconcileStrategy::default(),
            event_bus: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ReconcileStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Make the owned block rules equal to one rule per entry of `domains`.
    ///
    /// Issues at most one `apply_diff`. Nothing is sent when the installed set
    /// already matches.
    pub async fn reconcile_block_rules(
        &self,
        domains: &[ControlledDomain],
    ) -> Result<ReconcileReport, GatewayError> {
        let mut report = ReconcileReport::default();
        let desired = self.desired_block_rules(domains, &mut report);

        let owned: HashMap<RuleId, Rule> = self
            .rule_store
            .list_rules()
            .await?
            .into_iter()
            .filter(|rule| is_owned_block_id(rule.id))
            .map(|rule| (rule.id, rule))
            .collect();

        let (remove_ids, add_rules) = match self.strategy {
            ReconcileStrategy::FullRebuild => {
                let mut remove: Vec<RuleId> = owned.keys().copied().collect();
                remove.sort();
                (remove, desired.into_values().collect::<Vec<_>>())
            }
            ReconcileStrategy::Diff => {
                let mut remove: Vec<RuleId> = owned
                    .iter()
                    .filter(|(id, rule)| desired.get(*id) != Some(*rule))
                    .map(|(id, _)| *id)
                    .collect();
                remove.sort();
                let mut add = Vec::new();
                for (id, rule) in desired {
                    if owned.get(&id) == Some(&rule) {
                        report.unchanged += 1;
                    } else {
                        add.push(rule);
                    }
                }
                (remove, add)
            }
        };

        report.installed = add_rules.len();
        report.removed = remove_ids.len();

        if remove_ids.is_empty() && add_rules.is_empty() {
            debug!(unchanged = report.unchanged, "Block rules already converged");
        } else {
            self.rule_store.apply_diff(&remove_ids, &add_rules).await?;
            info!(
                installed = report.installed,
                removed = report.removed,
                unchanged = report.unchanged,
                strategy = ?self.strategy,
                "Reconciled block rules"
            );
        }

        self.publish(GatewayEvent::RulesReconciled {
            installed: report.installed,
            removed: report.removed,
            collisions: report.collisions.len(),
            reconciled_at: Utc::now(),
        });
        Ok(report)
    }

    /// Block rules keyed by id. The first domain in list order keeps a contested id.
    fn desired_block_rules(
        &self,
        domains: &[ControlledDomain],
        report: &mut ReconcileReport,
    ) -> BTreeMap<RuleId, Rule> {
        let mut owners: HashMap<RuleId, &ControlledDomain> = HashMap::new();
        let mut desired = BTreeMap::new();

        for domain in domains {
            let rule = block_rule(domain, &self.challenge_page);
            match owners.get(&rule.id) {
                Some(existing) if *existing == domain => {}
                Some(existing) => {
                    let collision = GatewayError::IdCollision {
                        id: rule.id,
                        existing: existing.to_string(),
                        incoming: domain.to_string(),
                    };
                    warn!(id = %rule.id, domain = %domain, existing = %existing, "Block rule id collision");
                    report.collisions.push(collision);
                }
                None => {
                    owners.insert(rule.id, domain);
                    desired.insert(rule.id, rule);
                }
            }
        }
        desired
    }

    /// Install (or reinstall) the allow rule letting `raw_context_id` reach `domain`.
    pub async fn grant_context_access(
        &self,
        domain: &ControlledDomain,
        raw_context_id: i64,
    ) -> Result<RuleId, GatewayError> {
        let context_id = ContextId::try_from(raw_context_id)?;
        let rule = allow_rule(domain, context_id);

        let installed = self.rule_store.list_rules().await?;
        if let Some(existing) = installed.iter().find(|r| r.id == rule.id) {
            if existing.condition != rule.condition {
                warn!(id = %rule.id, domain = %domain, context_id = %context_id, "Allow rule id collision");
                return Err(GatewayError::IdCollision {
                    id: rule.id,
                    existing: describe_scope(existing),
                    incoming: describe_scope(&rule),
                });
            }
        }

        self.rule_store.apply_diff(&[rule.id], &[rule.clone()]).await?;
        info!(id = %rule.id, domain = %domain, context_id = %context_id, "Granted context access");

        self.publish(GatewayEvent::AccessGranted {
            domain: domain.to_string(),
            context_id,
            granted_at: Utc::now(),
        });
        Ok(rule.id)
    }

    /// Remove every owned rule scoped to `context_id`. Returns how many were removed.
    pub async fn revoke_context_rules(&self, context_id: ContextId) -> Result<usize, GatewayError> {
        let ids: Vec<RuleId> = self
            .rule_store
            .list_rules()
            .await?
            .iter()
            .filter(|rule| is_owned_id(rule.id) && rule.is_scoped_to(context_id))
            .map(|rule| rule.id)
            .collect();

        if ids.is_empty() {
            debug!(context_id = %context_id, "No rules scoped to closed context");
            return Ok(0);
        }

        self.rule_store.apply_diff(&ids, &[]).await?;
        info!(context_id = %context_id, removed = ids.len(), "Revoked context rules");

        self.publish(GatewayEvent::ContextRevoked {
            context_id,
            rules_removed: ids.len(),
            revoked_at: Utc::now(),
        });
        Ok(ids.len())
    }

    fn publish(&self, event: GatewayEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn describe_scope(rule: &Rule) -> String {
    match &rule.condition.context_ids {
        Some(ids) => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            format!("{} in context {}", rule.condition.regex_filter, ids.join(","))
        }
        None => rule.condition.regex_filter.clone(),
    }
}
