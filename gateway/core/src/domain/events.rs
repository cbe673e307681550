// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::rule::ContextId;

/// Events flowing through the gateway event bus.
///
/// The first three are inputs from the platform (startup, storage change
/// notification, browsing context closed). The rest are published by the
/// gateway itself for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Started {
        started_at: DateTime<Utc>,
    },
    StoreChanged {
        key: String,
        changed_at: DateTime<Utc>,
    },
    ContextClosed {
        context_id: ContextId,
        closed_at: DateTime<Utc>,
    },
    RulesReconciled {
        installed: usize,
        removed: usize,
        collisions: usize,
        reconciled_at: DateTime<Utc>,
    },
    AccessGranted {
        domain: String,
        context_id: ContextId,
        granted_at: DateTime<Utc>,
    },
    ContextRevoked {
        context_id: ContextId,
        rules_removed: usize,
        revoked_at: DateTime<Utc>,
    },
}

impl GatewayEvent {
    pub fn started() -> Self {
        Self::Started {
            started_at: Utc::now(),
        }
    }

    pub fn store_changed(key: impl Into<String>) -> Self {
        Self::StoreChanged {
            key: key.into(),
            changed_at: Utc::now(),
        }
    }

    pub fn context_closed(context_id: ContextId) -> Self {
        Self::ContextClosed {
            context_id,
            closed_at: Utc::now(),
        }
    }
}
