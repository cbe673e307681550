// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Authenticator transports
//!
//! A transport opens one bidirectional byte channel per authentication call.
//! The production transport spawns the authenticator executable and talks to
//! it over its stdin/stdout; tests plug in in-memory duplex pipes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::domain::error::GatewayError;

const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Any full-duplex byte stream a session can run over.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// One open session: the byte stream plus the process behind it, if any.
pub struct SessionChannel {
    stream: Box<dyn DuplexStream>,
    child: Option<Child>,
}

impl SessionChannel {
    pub fn new(stream: impl DuplexStream + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            child: None,
        }
    }

    pub fn with_child(stream: impl DuplexStream + 'static, child: Child) -> Self {
        Self {
            stream: Box::new(stream),
            child: Some(child),
        }
    }

    pub(crate) fn into_parts(self) -> (Box<dyn DuplexStream>, SessionProcess) {
        (self.stream, SessionProcess(self.child))
    }
}

/// Process half of a session, reaped on [`SessionProcess::shutdown`].
pub(crate) struct SessionProcess(Option<Child>);

impl SessionProcess {
    /// Give the process a moment to exit on its own after stdin closed, then kill it.
    /// `force` skips the grace period.
    pub(crate) async fn shutdown(self, force: bool) {
        let Some(mut child) = self.0 else {
            return;
        };
        if force {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill authenticator process: {}", e);
            }
            return;
        }
        match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Authenticator process exited"),
            Ok(Err(e)) => warn!("Failed to wait for authenticator process: {}", e),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill authenticator process: {}", e);
                }
            }
        }
    }
}

#[async_trait]
pub trait AuthenticatorTransport: Send + Sync {
    /// Open a fresh channel. Failure is [`GatewayError::AuthConnectivity`].
    async fn open(&self) -> Result<SessionChannel, GatewayError>;
}

/// Spawns the authenticator executable once per session.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AuthenticatorTransport for ProcessTransport {
    async fn open(&self) -> Result<SessionChannel, GatewayError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GatewayError::AuthConnectivity(format!(
                    "cannot start authenticator {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(GatewayError::AuthConnectivity(
                "authenticator stdio was not captured".to_string(),
            ));
        };

        debug!(program = %self.program.display(), pid = ?child.id(), "Spawned authenticator");
        Ok(SessionChannel::with_child(tokio::io::join(stdout, stdin), child))
    }
}
