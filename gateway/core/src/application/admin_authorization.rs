// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Administrative authorization gate.
//!
//! Settings changes that weaken protection (removing a controlled domain)
//! need a fresh authentication. One success is honoured for the configured
//! window, so a burst of removals prompts once. State lives in memory only
//! and is shared by everything holding the same gate.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::auth::{admin_reason, AdminAuthCache, Authenticator, ADMIN_PRINCIPAL};
use crate::domain::clock::Clock;
use crate::domain::error::GatewayError;

pub struct AdminAuthorizationGate {
    authenticator: Arc<dyn Authenticator>,
    cache: Mutex<AdminAuthCache>,
    clock: Arc<dyn Clock>,
}

impl AdminAuthorizationGate {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        window: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            authenticator,
            cache: Mutex::new(AdminAuthCache::new(window)),
            clock,
        }
    }

    /// Succeed from cache, or prompt the user once and remember the success.
    ///
    /// The success is stamped with the instant the check began, so a slow
    /// prompt does not extend the window. Failures are returned unchanged.
    pub async fn ensure_admin_authorization(&self, action_label: &str) -> Result<(), GatewayError> {
        let started = self.clock.now();
        if self.cache.lock().is_fresh(started) {
            debug!(action = action_label, "Admin authorization served from cache");
            return Ok(());
        }

        self.authenticator
            .authenticate(ADMIN_PRINCIPAL, &admin_reason(action_label))
            .await?;

        self.cache.lock().record(started);
        info!(action = action_label, "Admin authorization granted");
        Ok(())
    }

    /// Succeed only from cache; never prompts.
    pub fn require_cached(&self, action_label: &str) -> Result<(), GatewayError> {
        if self.cache.lock().is_fresh(self.clock.now()) {
            Ok(())
        } else {
            Err(GatewayError::AuthorizationRequired(action_label.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::AuthResponse;
    use crate::domain::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingAuthenticator {
        prompts: AtomicUsize,
        allow: bool,
        last_reason: Mutex<Option<(String, String)>>,
    }

    impl CountingAuthenticator {
        fn new(allow: bool) -> Arc<Self> {
            Arc::new(Self {
                prompts: AtomicUsize::new(0),
                allow,
                last_reason: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn authenticate(&self, domain: &str, reason: &str) -> Result<AuthResponse, GatewayError> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            *self.last_reason.lock() = Some((domain.to_string(), reason.to_string()));
            if self.allow {
                Ok(AuthResponse::granted(domain))
            } else {
                Err(GatewayError::AuthDenied("User canceled".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_success_is_cached_for_the_window() {
        let authenticator = CountingAuthenticator::new(true);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gate = AdminAuthorizationGate::new(authenticator.clone(), Duration::from_secs(60), clock.clone());

        assert!(gate.require_cached("Remove a.com").is_err());
        gate.ensure_admin_authorization("Remove a.com").await.unwrap();
        assert_eq!(
            authenticator.last_reason.lock().clone(),
            Some((
                "Site Guardian".to_string(),
                "Manage controlled sites - Remove a.com".to_string()
            ))
        );

        clock.advance(chrono::Duration::seconds(30));
        gate.ensure_admin_authorization("Remove b.com").await.unwrap();
        gate.require_cached("Remove b.com").unwrap();
        assert_eq!(authenticator.prompts.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::seconds(31));
        assert!(matches!(
            gate.require_cached("Remove c.com"),
            Err(GatewayError::AuthorizationRequired(_))
        ));
        gate.ensure_admin_authorization("Remove c.com").await.unwrap();
        assert_eq!(authenticator.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_propagates_and_is_not_cached() {
        let authenticator = CountingAuthenticator::new(false);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gate = AdminAuthorizationGate::new(authenticator.clone(), Duration::from_secs(60), clock);

        let first = gate.ensure_admin_authorization("Remove a.com").await;
        assert_eq!(first, Err(GatewayError::AuthDenied("User canceled".to_string())));
        let _ = gate.ensure_admin_authorization("Remove a.com").await;
        assert_eq!(authenticator.prompts.load(Ordering::SeqCst), 2);
    }
}
