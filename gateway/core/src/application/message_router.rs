// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Message Router
//!
//! Request/response front door used by the challenge page, the settings UI
//! and `guardian serve`. Requests are JSON objects tagged by `action`; every
//! request gets exactly one JSON answer of the shape
//! `{"success": bool, "error"?: string, ...}`. Errors are reported in the
//! answer and never escape the router.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::domain_list::{AuthorizationMode, DomainListManager};
use crate::application::synchronizer::GatewaySynchronizer;
use crate::domain::auth::{navigation_reason, Authenticator};
use crate::domain::controlled_domain::ControlledDomain;
use crate::domain::error::GatewayError;
use crate::domain::rule::ContextId;
use crate::infrastructure::rule_store::{InMemoryRuleStore, NavigationOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum GatewayRequest {
    GetControlledSites,
    AddControlledSite {
        domain: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoveControlledSite {
        domain: String,
        /// `false` only accepts a cached admin authorization.
        #[serde(default = "default_allow_prompt")]
        allow_prompt: bool,
    },
    /// Navigation challenge. With `contextId`, a success also grants that context access.
    #[serde(rename_all = "camelCase")]
    Authenticate {
        domain: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        context_id: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    GrantContextAccess {
        domain: String,
        context_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    ContextClosed {
        context_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    Navigate {
        url: String,
        context_id: i64,
    },
}

fn default_allow_prompt() -> bool {
    true
}

pub struct MessageRouter {
    domains: DomainListManager,
    synchronizer: Arc<GatewaySynchronizer>,
    authenticator: Arc<dyn Authenticator>,
    engine: Option<InMemoryRuleStore>,
}

impl MessageRouter {
    pub fn new(
        domains: DomainListManager,
        synchronizer: Arc<GatewaySynchronizer>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            domains,
            synchronizer,
            authenticator,
            engine: None,
        }
    }

    /// Enable `navigate` against an in-process engine.
    pub fn with_engine(mut self, engine: InMemoryRuleStore) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Decode one raw request and answer it.
    pub async fn handle_json(&self, raw: &str) -> Value {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => return failure(format!("invalid JSON: {e}")),
        };
        if value.get("action").and_then(Value::as_str).is_none() {
            return failure("missing action field");
        }
        match serde_json::from_value::<GatewayRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => failure(format!("invalid request: {e}")),
        }
    }

    pub async fn handle(&self, request: GatewayRequest) -> Value {
        debug!(request = ?request, "Routing request");
        match self.dispatch(request).await {
            Ok(Value::Object(mut body)) => {
                body.insert("success".to_string(), Value::Bool(true));
                Value::Object(body)
            }
            Ok(_) => json!({ "success": true }),
            Err(e) => failure(e),
        }
    }

    async fn dispatch(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        match request {
            GatewayRequest::GetControlledSites => {
                Ok(json!({ "sites": self.domains.list().await }))
            }
            GatewayRequest::AddControlledSite { domain } => {
                let sites = self.domains.add(&domain).await?;
                Ok(json!({ "sites": sites }))
            }
            GatewayRequest::RemoveControlledSite {
                domain,
                allow_prompt,
            } => {
                let mode = if allow_prompt {
                    AuthorizationMode::Prompt
                } else {
                    AuthorizationMode::CachedOnly
                };
                let sites = self.domains.remove_with(&domain, mode).await?;
                Ok(json!({ "sites": sites }))
            }
            GatewayRequest::Authenticate {
                domain,
                reason,
                context_id,
            } => {
                let domain = ControlledDomain::parse(&domain)?;
                if let Some(raw) = context_id {
                    ContextId::try_from(raw)?;
                }
                let reason = reason.unwrap_or_else(|| navigation_reason(domain.as_str()));
                let response = self
                    .authenticator
                    .authenticate(domain.as_str(), &reason)
                    .await?;

                let rule_id = match context_id {
                    Some(raw) => Some(self.synchronizer.grant_context_access(&domain, raw).await?),
                    None => None,
                };
                Ok(json!({
                    "domain": domain,
                    "timestamp": response.timestamp,
                    "ruleId": rule_id,
                }))
            }
            GatewayRequest::GrantContextAccess { domain, context_id } => {
                let domain = ControlledDomain::parse(&domain)?;
                let rule_id = self
                    .synchronizer
                    .grant_context_access(&domain, context_id)
                    .await?;
                Ok(json!({ "ruleId": rule_id }))
            }
            GatewayRequest::ContextClosed { context_id } => {
                let context_id = ContextId::try_from(context_id)?;
                let removed = self.synchronizer.revoke_context_rules(context_id).await?;
                Ok(json!({ "rulesRemoved": removed }))
            }
            GatewayRequest::Navigate { url, context_id } => {
                let context_id = ContextId::try_from(context_id)?;
                let engine = self.engine.as_ref().ok_or_else(|| {
                    GatewayError::RuleStore("navigation evaluation is not available".to_string())
                })?;
                Ok(match engine.evaluate(&url, context_id) {
                    NavigationOutcome::Allowed { rule_id } => json!({
                        "outcome": "allowed",
                        "ruleId": rule_id,
                    }),
                    NavigationOutcome::Redirected { rule_id, target } => json!({
                        "outcome": "redirected",
                        "ruleId": rule_id,
                        "target": target,
                    }),
                })
            }
        }
    }
}

fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}
