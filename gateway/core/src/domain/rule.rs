// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Declarative Redirect Rules
//!
//! Value objects shared with the external redirect engine. The JSON shape
//! (`id`, `priority`, `action`, `condition`) is the engine's own wire format,
//! so field names are camelCase on the wire.
//!
//! Two kinds of rule are ever produced by the gateway:
//!
//! | Kind | Action | Priority | Scope |
//! |------|--------|----------|-------|
//! | Block | `redirect` to the challenge page | [`BLOCK_PRIORITY`] | every context |
//! | Allow | `allow` | [`ALLOW_PRIORITY`] | exactly one context |

use serde::{Deserialize, Serialize};

use crate::domain::error::GatewayError;

pub const BLOCK_PRIORITY: u32 = 1;
pub const ALLOW_PRIORITY: u32 = 100;

/// Numeric rule identifier in the engine's shared id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u32);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one browsing context (a tab). Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u32);

impl ContextId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for ContextId {
    type Error = GatewayError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| GatewayError::InvalidContext(raw.to_string()))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level document loads.
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    /// Send the navigation elsewhere. `\0` in the substitution expands to the matched URL.
    #[serde(rename_all = "camelCase")]
    Redirect { regex_substitution: String },
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub regex_filter: String,
    pub resource_types: Vec<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_ids: Option<Vec<ContextId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    /// True when the rule's context scope names `context_id`.
    ///
    /// Unscoped rules apply to every context but are *not* scoped to any one
    /// of them, so they never match here.
    pub fn is_scoped_to(&self, context_id: ContextId) -> bool {
        self.condition
            .context_ids
            .as_ref()
            .is_some_and(|ids| ids.contains(&context_id))
    }

    /// True when the rule applies to navigations in `context_id`.
    pub fn applies_to(&self, context_id: ContextId) -> bool {
        match &self.condition.context_ids {
            None => true,
            Some(ids) => ids.contains(&context_id),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self.action, RuleAction::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_rejects_negative() {
        assert_eq!(ContextId::try_from(7_i64).unwrap(), ContextId(7));
        assert!(matches!(
            ContextId::try_from(-1_i64),
            Err(GatewayError::InvalidContext(_))
        ));
        assert!(ContextId::try_from(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_rule_wire_shape() {
        let rule = Rule {
            id: RuleId(123456),
            priority: BLOCK_PRIORITY,
            action: RuleAction::Redirect {
                regex_substitution: "guardian://gate?targetUrl=\\0".to_string(),
            },
            condition: RuleCondition {
                regex_filter: "^https?://x$".to_string(),
                resource_types: vec![ResourceType::MainFrame],
                context_ids: None,
            },
        };

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["id"], 123456);
        assert_eq!(json["action"]["type"], "redirect");
        assert_eq!(json["action"]["regexSubstitution"], "guardian://gate?targetUrl=\\0");
        assert_eq!(json["condition"]["resourceTypes"][0], "main_frame");
        assert!(json["condition"].get("contextIds").is_none());
    }

    #[test]
    fn test_scope_checks() {
        let mut rule = Rule {
            id: RuleId(1),
            priority: ALLOW_PRIORITY,
            action: RuleAction::Allow,
            condition: RuleCondition {
                regex_filter: ".*".to_string(),
                resource_types: vec![ResourceType::MainFrame],
                context_ids: Some(vec![ContextId(7)]),
            },
        };
        assert!(rule.is_scoped_to(ContextId(7)));
        assert!(!rule.is_scoped_to(ContextId(8)));
        assert!(!rule.applies_to(ContextId(8)));

        rule.condition.context_ids = None;
        assert!(!rule.is_scoped_to(ContextId(7)));
        assert!(rule.applies_to(ContextId(8)));
    }
}
