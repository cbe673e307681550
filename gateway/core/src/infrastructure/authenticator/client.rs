// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Authenticator Session Client
//!
//! Runs exactly one challenge/response exchange per call:
//! open channel → send challenge → wait for the first of {response,
//! disconnect, timeout} → tear the channel down. Each call owns its channel,
//! so concurrent calls never share session state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::auth::{AuthRequest, AuthResponse, AuthSession, Authenticator, SessionState};
use crate::domain::error::GatewayError;
use crate::infrastructure::authenticator::codec::{framed, recv_message, send_message};
use crate::infrastructure::authenticator::transport::AuthenticatorTransport;

pub struct AuthenticatorClient {
    transport: Arc<dyn AuthenticatorTransport>,
    timeout: Duration,
    max_frame_length: usize,
}

impl AuthenticatorClient {
    pub fn new(
        transport: Arc<dyn AuthenticatorTransport>,
        timeout: Duration,
        max_frame_length: usize,
    ) -> Self {
        Self {
            transport,
            timeout,
            max_frame_length,
        }
    }

    /// Run one exchange and return the session record alongside its outcome.
    pub async fn run_session(
        &self,
        domain: &str,
        reason: &str,
    ) -> (AuthSession, Result<AuthResponse, GatewayError>) {
        let mut session = AuthSession::new(domain, reason);
        session.transition(SessionState::Connecting);
        debug!(session_id = %session.id, domain, "Opening authenticator session");

        let channel = match self.transport.open().await {
            Ok(channel) => channel,
            Err(e) => {
                let result = Err(e);
                session.resolve(&result);
                return (session, result);
            }
        };

        let (stream, process) = channel.into_parts();
        let mut channel = framed(stream, self.max_frame_length);
        let request = AuthRequest::authenticate(domain, reason);

        let exchange = async {
            send_message(&mut channel, &request).await?;
            session.transition(SessionState::AwaitingResponse);
            match recv_message::<_, AuthResponse>(&mut channel).await {
                Some(result) => result,
                None => Err(GatewayError::AuthConnectivity(
                    "authenticator closed the channel before responding".to_string(),
                )),
            }
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::AuthTimeout(self.timeout)),
        };

        // Release the channel on every path before reporting.
        let timed_out = matches!(result, Err(GatewayError::AuthTimeout(_)));
        drop(channel);
        process.shutdown(timed_out).await;

        if session.state == SessionState::Connecting {
            // Failed before the challenge went out.
            session.transition(SessionState::AwaitingResponse);
        }
        session.resolve(&result);
        (session, result)
    }
}

#[async_trait]
impl Authenticator for AuthenticatorClient {
    async fn authenticate(&self, domain: &str, reason: &str) -> Result<AuthResponse, GatewayError> {
        let (session, result) = self.run_session(domain, reason).await;
        let result = result.and_then(AuthResponse::into_result);

        match &result {
            Ok(_) => info!(session_id = %session.id, domain, "Authentication succeeded"),
            Err(e) => warn!(
                session_id = %session.id,
                domain,
                state = ?session.state,
                "Authentication failed: {}",
                e
            ),
        }
        result
    }
}
