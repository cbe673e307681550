// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Session client talking to the bundled authenticator host over in-memory pipes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use site_guardian_core::auth::{Authenticator, SessionState};
use site_guardian_core::error::GatewayError;
use site_guardian_core::infrastructure::authenticator::{
    AuthenticatorClient, AuthenticatorHost, AuthenticatorTransport, FixedVerifier, SessionChannel,
    Verifier,
};

/// Runs a fresh host on the far end of a duplex pipe for each session.
struct InProcessHost {
    verifier: fn() -> Box<dyn Verifier>,
}

#[async_trait]
impl AuthenticatorTransport for InProcessHost {
    async fn open(&self) -> Result<SessionChannel, GatewayError> {
        let (near, far) = tokio::io::duplex(8192);
        let host = AuthenticatorHost::new((self.verifier)(), 8192);
        tokio::spawn(async move { host.serve(far).await });
        Ok(SessionChannel::new(near))
    }
}

/// Accepts the connection and then never reads or writes again.
struct SilentPeer {
    hung_up: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl AuthenticatorTransport for SilentPeer {
    async fn open(&self) -> Result<SessionChannel, GatewayError> {
        let (near, mut far) = tokio::io::duplex(8192);
        let hung_up = self.hung_up.clone();
        tokio::spawn(async move {
            let mut sink = Vec::new();
            // Returns once the client side is dropped.
            let _ = far.read_to_end(&mut sink).await;
            hung_up.notify_one();
        });
        Ok(SessionChannel::new(near))
    }
}

fn allow_all() -> Box<dyn Verifier> {
    Box::new(FixedVerifier::allow())
}

fn deny_all() -> Box<dyn Verifier> {
    Box::new(FixedVerifier::deny())
}

fn client(transport: impl AuthenticatorTransport + 'static, timeout: Duration) -> AuthenticatorClient {
    AuthenticatorClient::new(Arc::new(transport), timeout, 8192)
}

#[tokio::test]
async fn test_host_grant_reaches_the_client() {
    let client = client(
        InProcessHost {
            verifier: allow_all,
        },
        Duration::from_secs(5),
    );

    let response = client
        .authenticate("bank.com", "Authenticate to access bank.com")
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.domain, "bank.com");
    assert!(response.timestamp > 0.0);
}

#[tokio::test]
async fn test_host_refusal_is_auth_denied() {
    let client = client(
        InProcessHost {
            verifier: deny_all,
        },
        Duration::from_secs(5),
    );

    let (session, result) = client.run_session("bank.com", "r").await;
    assert_eq!(session.state, SessionState::Resolved { success: false });
    assert!(result.unwrap().error.is_some());

    assert_eq!(
        client.authenticate("bank.com", "r").await,
        Err(GatewayError::AuthDenied("verification refused".to_string()))
    );
}

#[tokio::test]
async fn test_unanswered_challenge_times_out_and_closes_the_session() {
    let hung_up = Arc::new(tokio::sync::Notify::new());
    let client = client(
        SilentPeer {
            hung_up: hung_up.clone(),
        },
        Duration::from_millis(200),
    );

    let (session, result) = client.run_session("bank.com", "r").await;
    assert_eq!(result, Err(GatewayError::AuthTimeout(Duration::from_millis(200))));
    assert_eq!(session.state, SessionState::TimedOut);
    assert!(session.resolved_at.is_some());

    tokio::time::timeout(Duration::from_secs(5), hung_up.notified())
        .await
        .expect("session channel was not closed after the timeout");
}
