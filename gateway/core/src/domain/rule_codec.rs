// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Rule Codec
//!
//! Pure functions mapping controlled domains to redirect-engine rules.
//!
//! Rule ids are derived from the domain string instead of a persisted counter,
//! so the same domain gets the same id across restarts. The gateway owns two
//! disjoint id ranges in the engine's shared id space:
//!
//! ```text
//! 0 ........ 100_000 ......... 900_000 ....... 1_900_000_001 ..... 2_000_000_001
//!   foreign  | block rules       | foreign       | allow rules        | foreign
//! ```
//!
//! Ids outside both ranges belong to other subsystems and are never touched.

use std::ops::Range;

use crate::domain::controlled_domain::ControlledDomain;
use crate::domain::rule::{
    ContextId, ResourceType, Rule, RuleAction, RuleCondition, RuleId, ALLOW_PRIORITY,
    BLOCK_PRIORITY,
};

pub const BLOCK_ID_RANGE: Range<u32> = 100_000..900_000;
pub const ALLOW_ID_RANGE: Range<u32> = 1_900_000_001..2_000_000_001;

const ALLOW_ID_CEILING: u32 = 2_000_000_000;
const CONTEXT_SLOTS: u32 = 100_000;
const DOMAIN_SLOTS: u32 = 1_000;

/// Anchored pattern matching `http(s)://` + the domain or any subdomain, with an optional path.
pub fn domain_to_regex(domain: &ControlledDomain) -> String {
    format!(r"^https?://([^.]+\.)*{}(/.*)?$", regex::escape(domain.as_str()))
}

/// Stable id of the block rule for `domain`, inside [`BLOCK_ID_RANGE`].
///
/// 32-bit wrapping `h * 31 + c` over the UTF-16 code units, folded into the range.
pub fn block_rule_id(domain: &ControlledDomain) -> RuleId {
    let hash = domain
        .as_str()
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let span = u64::from(BLOCK_ID_RANGE.end - BLOCK_ID_RANGE.start);
    let folded = u64::from(hash.unsigned_abs()) % span;
    RuleId(BLOCK_ID_RANGE.start + folded as u32)
}

/// Stable id of the allow rule for (`domain`, `context_id`), inside [`ALLOW_ID_RANGE`].
pub fn allow_rule_id(domain: &ControlledDomain, context_id: ContextId) -> RuleId {
    let base = block_rule_id(domain).0;
    let offset = (context_id.value() % CONTEXT_SLOTS) * DOMAIN_SLOTS + base % DOMAIN_SLOTS;
    RuleId(ALLOW_ID_CEILING - offset)
}

pub fn is_owned_block_id(id: RuleId) -> bool {
    BLOCK_ID_RANGE.contains(&id.0)
}

pub fn is_owned_allow_id(id: RuleId) -> bool {
    ALLOW_ID_RANGE.contains(&id.0)
}

/// True when the gateway may remove `id` from the engine.
pub fn is_owned_id(id: RuleId) -> bool {
    is_owned_block_id(id) || is_owned_allow_id(id)
}

/// Redirect target for a blocked navigation. The engine expands `\0` to the original URL.
pub fn challenge_substitution(challenge_page: &str, domain: &ControlledDomain) -> String {
    format!("{challenge_page}?targetUrl=\\0&domain={domain}")
}

/// Low-priority rule redirecting every main-frame load of `domain` to the challenge page.
pub fn block_rule(domain: &ControlledDomain, challenge_page: &str) -> Rule {
    Rule {
        id: block_rule_id(domain),
        priority: BLOCK_PRIORITY,
        action: RuleAction::Redirect {
            regex_substitution: challenge_substitution(challenge_page, domain),
        },
        condition: RuleCondition {
            regex_filter: domain_to_regex(domain),
            resource_types: vec![ResourceType::MainFrame],
            context_ids: None,
        },
    }
}

/// High-priority rule letting `context_id` through to `domain`, overriding its block rule.
pub fn allow_rule(domain: &ControlledDomain, context_id: ContextId) -> Rule {
    Rule {
        id: allow_rule_id(domain, context_id),
        priority: ALLOW_PRIORITY,
        action: RuleAction::Allow,
        condition: RuleCondition {
            regex_filter: domain_to_regex(domain),
            resource_types: vec![ResourceType::MainFrame],
            context_ids: Some(vec![context_id]),
        },
    }
}
