// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Authenticator Host
//!
//! The other end of the authenticator channel: reads framed challenges,
//! asks a [`Verifier`] to confirm the user, and answers each challenge with
//! exactly one framed response. `guardian host` runs this over stdin/stdout
//! so the gateway's `ProcessTransport` can spawn it.
//!
//! # Error answers
//!
//! | Input                       | Answer `error`              | Loop    |
//! |-----------------------------|-----------------------------|---------|
//! | frame is not JSON           | `invalid JSON: ...`         | continue|
//! | no string `action` field    | `missing action field`      | continue|
//! | unknown `action`            | `unknown action: <action>`  | continue|
//! | frame exceeds size limit    | `bad frame: ...`            | stop    |

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::auth::AuthResponse;
use crate::domain::error::GatewayError;
use crate::domain::gateway_config::VerifierConfig;
use crate::infrastructure::authenticator::codec::{framed, send_message};

const UNKNOWN_DOMAIN: &str = "unknown site";
const DEFAULT_REASON: &str = "Verify site access";

/// Confirms the user's presence for one challenge.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// `Err` carries the message reported back to the gateway.
    async fn verify(&self, domain: &str, reason: &str) -> Result<(), String>;
}

/// Always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedVerifier {
    allow: bool,
}

impl FixedVerifier {
    pub fn allow() -> Self {
        Self { allow: true }
    }

    pub fn deny() -> Self {
        Self { allow: false }
    }
}

#[async_trait]
impl Verifier for FixedVerifier {
    async fn verify(&self, _domain: &str, _reason: &str) -> Result<(), String> {
        if self.allow {
            Ok(())
        } else {
            Err("verification refused".to_string())
        }
    }
}

/// Runs an external command per challenge; exit status 0 means verified.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandVerifier {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render_args(&self, domain: &str, reason: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{domain}", domain).replace("{reason}", reason))
            .collect()
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self, domain: &str, reason: &str) -> Result<(), String> {
        let status = Command::new(&self.program)
            .args(self.render_args(domain, reason))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| format!("cannot run verifier {}: {}", self.program.display(), e))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("verification failed ({status})"))
        }
    }
}

/// Build the verifier named in the host configuration.
pub fn verifier_from_config(config: &VerifierConfig) -> Box<dyn Verifier> {
    match config {
        VerifierConfig::Command { program, args } => {
            Box::new(CommandVerifier::new(program.clone(), args.clone()))
        }
        VerifierConfig::Allow => Box::new(FixedVerifier::allow()),
        VerifierConfig::Deny => Box::new(FixedVerifier::deny()),
    }
}

pub struct AuthenticatorHost {
    verifier: Box<dyn Verifier>,
    max_frame_length: usize,
}

impl AuthenticatorHost {
    pub fn new(verifier: Box<dyn Verifier>, max_frame_length: usize) -> Self {
        Self {
            verifier,
            max_frame_length,
        }
    }

    /// Serve challenges until the peer closes the stream. Returns the number of frames answered.
    pub async fn serve<S>(&self, stream: S) -> Result<usize, GatewayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut channel = framed(stream, self.max_frame_length);
        let mut answered = 0usize;

        while let Some(frame) = channel.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    let message = format!("bad frame: {e}");
                    warn!("{}", message);
                    // The stream is no longer in sync; answer once and stop.
                    if let Err(send_error) =
                        send_message(&mut channel, &error_response(&message)).await
                    {
                        warn!(error = %send_error, "Could not deliver bad-frame answer");
                    }
                    return Err(GatewayError::Protocol(message));
                }
            };

            let response = self.handle_frame(&frame).await;
            send_message(&mut channel, &response).await?;
            answered += 1;
        }

        debug!(answered, "Authenticator channel closed");
        Ok(answered)
    }

    pub async fn serve_stdio(&self) -> Result<usize, GatewayError> {
        self.serve(tokio::io::join(tokio::io::stdin(), tokio::io::stdout()))
            .await
    }

    async fn handle_frame(&self, frame: &[u8]) -> AuthResponse {
        let message: Value = match serde_json::from_slice(frame) {
            Ok(message) => message,
            Err(e) => return error_response(&format!("invalid JSON: {e}")),
        };

        let Some(action) = message.get("action").and_then(Value::as_str) else {
            return error_response("missing action field");
        };

        match action {
            "authenticate" => {
                let domain = message
                    .get("domain")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_DOMAIN);
                let reason = message
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_REASON);
                self.authenticate(domain, reason).await
            }
            other => error_response(&format!("unknown action: {other}")),
        }
    }

    async fn authenticate(&self, domain: &str, reason: &str) -> AuthResponse {
        match self.verifier.verify(domain, reason).await {
            Ok(()) => {
                info!(domain, "Challenge verified");
                AuthResponse::granted(domain)
            }
            Err(e) => {
                info!(domain, error = %e, "Challenge refused");
                AuthResponse::denied(domain, e)
            }
        }
    }
}

fn error_response(message: &str) -> AuthResponse {
    AuthResponse::denied(String::new(), message)
}
