// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication Session Domain (challenge/response with the authenticator)
//!
//! One [`AuthSession`] models exactly one challenge/response exchange with the
//! external authenticator process:
//!
//! ```text
//! Idle ─► Connecting ─► AwaitingResponse ─┬─► Resolved { success }
//!             │                           ├─► TimedOut
//!             └───────────────────────────┴─► Disconnected
//! ```
//!
//! Sessions are never persisted and never shared between calls. The
//! [`AdminAuthCache`] is the only authentication state that outlives a session.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::GatewayError;

/// Principal shown in the prompt for administrative (settings) authentication.
pub const ADMIN_PRINCIPAL: &str = "Site Guardian";

/// Outbound frame to the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AuthRequest {
    Authenticate { domain: String, reason: String },
}

impl AuthRequest {
    pub fn authenticate(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authenticate {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}

/// Inbound frame from the authenticator. Error answers use the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub domain: String,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: f64,
}

impl AuthResponse {
    pub fn granted(domain: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            domain: domain.into(),
            timestamp: epoch_seconds(Utc::now()),
        }
    }

    pub fn denied(domain: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            domain: domain.into(),
            timestamp: epoch_seconds(Utc::now()),
        }
    }

    /// Map an explicit `success: false` to [`GatewayError::AuthDenied`].
    pub fn into_result(self) -> Result<Self, GatewayError> {
        if self.success {
            Ok(self)
        } else {
            let message = self
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "authentication failed".to_string());
            Err(GatewayError::AuthDenied(message))
        }
    }
}

pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Prompt text for a navigation challenge.
pub fn navigation_reason(domain: &str) -> String {
    format!("Authenticate to access {domain}")
}

/// Prompt text for an administrative action.
pub fn admin_reason(action_label: &str) -> String {
    format!("Manage controlled sites - {action_label}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingResponse,
    Resolved { success: bool },
    TimedOut,
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Resolved { .. } | Self::TimedOut | Self::Disconnected
        )
    }

    fn can_become(&self, next: &SessionState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Connecting) => true,
            (Self::Connecting, Self::AwaitingResponse) => true,
            (Self::Connecting, Self::Disconnected) => true,
            (Self::AwaitingResponse, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// One challenge/response exchange.
///
/// # Invariants
///
/// - Exactly one terminal state is ever reached; later transitions are refused.
/// - `resolved_at` is set exactly when the state becomes terminal.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: SessionId,
    pub domain: String,
    pub reason: String,
    pub state: SessionState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            domain: domain.into(),
            reason: reason.into(),
            state: SessionState::Idle,
            error: None,
            started_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Move to `next`. Returns false (and changes nothing) for an illegal transition.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_become(&next) {
            return false;
        }
        self.state = next;
        if next.is_terminal() {
            self.resolved_at = Some(Utc::now());
        }
        true
    }

    /// Record the terminal outcome of `result` on the session.
    pub fn resolve(&mut self, result: &Result<AuthResponse, GatewayError>) -> bool {
        let next = match result {
            Ok(response) => SessionState::Resolved {
                success: response.success,
            },
            Err(GatewayError::AuthTimeout(_)) => SessionState::TimedOut,
            Err(GatewayError::AuthConnectivity(_)) => SessionState::Disconnected,
            Err(_) => SessionState::Resolved { success: false },
        };
        let moved = self.transition(next);
        if moved {
            self.error = match result {
                Ok(response) => response.error.clone(),
                Err(e) => Some(e.to_string()),
            };
        }
        moved
    }
}

/// The external authenticator, as seen by the application layer.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Run one challenge/response exchange.
    ///
    /// `Ok` only for an explicit success; an explicit refusal is
    /// [`GatewayError::AuthDenied`].
    async fn authenticate(&self, domain: &str, reason: &str) -> Result<AuthResponse, GatewayError>;
}

/// Timestamp of the last successful administrative authentication.
#[derive(Debug, Clone)]
pub struct AdminAuthCache {
    last_success: Option<DateTime<Utc>>,
    window: chrono::Duration,
}

impl AdminAuthCache {
    pub fn new(window: Duration) -> Self {
        Self {
            last_success: None,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Fresh when `now - last_success <= window`. A timestamp in the future is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.last_success {
            Some(at) => {
                let age = now - at;
                age >= chrono::Duration::zero() && age <= self.window
            }
            None => false,
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.last_success = Some(at);
    }
}
