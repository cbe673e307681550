// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Domain List Manager Application Service
//!
//! Owns the controlled-domain list stored under `controlledSites` in the
//! settings mapping. Every mutation is a read-modify-write cycle run by one
//! writer task, so concurrent add/remove calls are applied one after the
//! other and none is lost.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Canonicalize, deduplicate and persist controlled domains
//! - **Integration:** KeyValueStore (persisted list) → `StoreChanged` → event bridge
//!
//! Removal weakens protection and is gated behind administrative
//! authorization, which is checked *before* the mutation is queued. Adding
//! is never gated.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::application::admin_authorization::AdminAuthorizationGate;
use crate::domain::controlled_domain::ControlledDomain;
use crate::domain::error::GatewayError;
use crate::domain::repository::{KeyValueStore, CONTROLLED_SITES_KEY};
use crate::domain::rule_codec::block_rule_id;

const COMMAND_QUEUE_DEPTH: usize = 64;

type Reply = oneshot::Sender<Result<Vec<ControlledDomain>, GatewayError>>;

enum ListCommand {
    Add {
        domain: ControlledDomain,
        reply: Reply,
    },
    Remove {
        domain: ControlledDomain,
        reply: Reply,
    },
}

/// How `remove` obtains administrative authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationMode {
    /// Prompt the user when the cached authorization has expired.
    Prompt,
    /// Only accept a cached authorization; fail with `AuthorizationRequired` otherwise.
    CachedOnly,
}

#[derive(Clone)]
pub struct DomainListManager {
    store: Arc<dyn KeyValueStore>,
    gate: Arc<AdminAuthorizationGate>,
    commands: mpsc::Sender<ListCommand>,
}

impl DomainListManager {
    /// Start the writer task and return a handle to it. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, gate: Arc<AdminAuthorizationGate>) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(ListWriter { store: store.clone() }.run(receiver));
        Self {
            store,
            gate,
            commands,
        }
    }

    /// Current list, or the read error.
    pub async fn current(&self) -> Result<Vec<ControlledDomain>, GatewayError> {
        read_list(self.store.as_ref()).await
    }

    /// Current list. A read failure is logged and reported as an empty list.
    pub async fn list(&self) -> Vec<ControlledDomain> {
        match self.current().await {
            Ok(domains) => domains,
            Err(e) => {
                warn!("Failed to read controlled domains, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Add `input` after canonicalizing it. Adding an existing domain is a no-op.
    pub async fn add(&self, input: &str) -> Result<Vec<ControlledDomain>, GatewayError> {
        let domain = ControlledDomain::parse(input)?;
        self.submit(|reply| ListCommand::Add { domain, reply }).await
    }

    /// Remove `input`, prompting for administrative authorization if needed.
    pub async fn remove(&self, input: &str) -> Result<Vec<ControlledDomain>, GatewayError> {
        self.remove_with(input, AuthorizationMode::Prompt).await
    }

    pub async fn remove_with(
        &self,
        input: &str,
        mode: AuthorizationMode,
    ) -> Result<Vec<ControlledDomain>, GatewayError> {
        let domain = ControlledDomain::parse(input)?;
        let label = format!("Remove {domain}");
        match mode {
            AuthorizationMode::Prompt => self.gate.ensure_admin_authorization(&label).await?,
            AuthorizationMode::CachedOnly => self.gate.require_cached(&label)?,
        }
        self.submit(|reply| ListCommand::Remove { domain, reply }).await
    }

    async fn submit(
        &self,
        command: impl FnOnce(Reply) -> ListCommand,
    ) -> Result<Vec<ControlledDomain>, GatewayError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| writer_stopped())?;
        response.await.map_err(|_| writer_stopped())?
    }
}

fn writer_stopped() -> GatewayError {
    GatewayError::StoreWrite {
        key: CONTROLLED_SITES_KEY.to_string(),
        message: "domain list writer has stopped".to_string(),
    }
}

/// Single writer for the persisted list.
struct ListWriter {
    store: Arc<dyn KeyValueStore>,
}

impl ListWriter {
    async fn run(self, mut receiver: mpsc::Receiver<ListCommand>) {
        debug!("Domain list writer started");
        while let Some(command) = receiver.recv().await {
            match command {
                ListCommand::Add { domain, reply } => {
                    let _ = reply.send(self.add(domain).await);
                }
                ListCommand::Remove { domain, reply } => {
                    let _ = reply.send(self.remove(domain).await);
                }
            }
        }
        debug!("Domain list writer stopped");
    }

    async fn add(&self, domain: ControlledDomain) -> Result<Vec<ControlledDomain>, GatewayError> {
        let mut domains = read_list(self.store.as_ref()).await?;
        if domains.contains(&domain) {
            debug!(domain = %domain, "Domain already controlled");
            return Ok(domains);
        }

        let id = block_rule_id(&domain);
        if let Some(existing) = domains.iter().find(|d| block_rule_id(d) == id) {
            warn!(domain = %domain, existing = %existing, id = %id, "Refusing domain with colliding rule id");
            return Err(GatewayError::IdCollision {
                id,
                existing: existing.to_string(),
                incoming: domain.to_string(),
            });
        }

        domains.push(domain.clone());
        write_list(self.store.as_ref(), &domains).await?;
        info!(domain = %domain, total = domains.len(), "Added controlled domain");
        Ok(domains)
    }

    async fn remove(&self, domain: ControlledDomain) -> Result<Vec<ControlledDomain>, GatewayError> {
        let mut domains = read_list(self.store.as_ref()).await?;
        let before = domains.len();
        domains.retain(|d| d != &domain);
        if domains.len() == before {
            debug!(domain = %domain, "Domain was not controlled");
            return Ok(domains);
        }

        write_list(self.store.as_ref(), &domains).await?;
        info!(domain = %domain, total = domains.len(), "Removed controlled domain");
        Ok(domains)
    }
}

/// Read and canonicalize the stored list. Unusable entries are skipped.
pub async fn read_list(store: &dyn KeyValueStore) -> Result<Vec<ControlledDomain>, GatewayError> {
    let value = match store.get(CONTROLLED_SITES_KEY).await? {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => value,
    };
    let Value::Array(entries) = value else {
        return Err(GatewayError::StoreRead {
            key: CONTROLLED_SITES_KEY.to_string(),
            message: "stored value is not a list".to_string(),
        });
    };

    let mut domains: Vec<ControlledDomain> = Vec::with_capacity(entries.len());
    for entry in entries {
        let parsed = entry
            .as_str()
            .ok_or_else(|| GatewayError::InvalidDomain(entry.to_string()))
            .and_then(ControlledDomain::parse);
        match parsed {
            Ok(domain) if !domains.contains(&domain) => domains.push(domain),
            Ok(_) => {}
            Err(e) => warn!("Skipping stored entry: {}", e),
        }
    }
    Ok(domains)
}

async fn write_list(store: &dyn KeyValueStore, domains: &[ControlledDomain]) -> Result<(), GatewayError> {
    let value = Value::Array(
        domains
            .iter()
            .map(|d| Value::String(d.to_string()))
            .collect(),
    );
    store.set(CONTROLLED_SITES_KEY, value).await
}
