// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process gateway assembly
//!
//! Builds every gateway service from a [`GatewayConfig`]: the file-backed
//! settings store, the in-process redirect engine, the authenticator client
//! and the application services wired on top of them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use site_guardian_core::{
    application::{
        AdminAuthorizationGate, DomainListManager, EventBridge, GatewaySynchronizer,
        MessageRouter,
    },
    clock::SystemClock,
    events::GatewayEvent,
    gateway_config::GatewayConfig,
    infrastructure::{
        authenticator::{AuthenticatorClient, ProcessTransport},
        EventBus, FileKeyValueStore, InMemoryRuleStore,
    },
};

pub struct GatewayServices {
    pub event_bus: EventBus,
    pub engine: InMemoryRuleStore,
    pub synchronizer: Arc<GatewaySynchronizer>,
    pub authenticator: Arc<AuthenticatorClient>,
    pub domains: DomainListManager,
    settings: Arc<FileKeyValueStore>,
    poll_interval: Duration,
}

impl GatewayServices {
    /// Must be called inside a tokio runtime; the domain list writer is spawned here.
    ///
    /// `config_path` is the file given on the command line, if any. The built-in
    /// authenticator host is started with the same file.
    pub fn from_config(config: &GatewayConfig, config_path: Option<&Path>) -> Result<Self> {
        let spec = &config.spec;
        let event_bus = EventBus::with_default_capacity();

        let store_path = spec.storage.resolved_path();
        info!(path = %store_path.display(), "Using settings store");
        let store = Arc::new(FileKeyValueStore::with_event_bus(store_path, event_bus.clone()));

        let engine = InMemoryRuleStore::new(spec.rules.max_rules);
        let synchronizer = Arc::new(
            GatewaySynchronizer::new(Arc::new(engine.clone()), spec.rules.challenge_page.clone())
                .with_strategy(spec.rules.strategy)
                .with_event_bus(event_bus.clone()),
        );

        let (program, args) = authenticator_command(config, config_path)?;
        info!(program = %program.display(), "Using authenticator");
        let authenticator = Arc::new(AuthenticatorClient::new(
            Arc::new(ProcessTransport::new(program, args)),
            spec.authenticator.timeout,
            spec.authenticator.max_frame_length,
        ));

        let gate = Arc::new(AdminAuthorizationGate::new(
            authenticator.clone(),
            spec.admin_auth.window,
            Arc::new(SystemClock),
        ));
        let domains = DomainListManager::spawn(store.clone(), gate);

        Ok(Self {
            event_bus,
            engine,
            synchronizer,
            authenticator,
            domains,
            settings: store,
            poll_interval: spec.storage.poll_interval,
        })
    }

    /// Start the event bridge and announce startup so the persisted list is reconciled.
    pub fn start_bridge(&self) -> JoinHandle<()> {
        let handle = EventBridge::new(&self.event_bus, self.domains.clone(), self.synchronizer.clone())
            .start();
        self.event_bus.publish(GatewayEvent::started());
        handle
    }

    /// Announce settings-file changes made by other processes on the event bus.
    pub async fn watch_settings(&self) -> JoinHandle<()> {
        self.settings.clone().watch(self.poll_interval).await
    }

    pub fn router(&self) -> MessageRouter {
        MessageRouter::new(
            self.domains.clone(),
            self.synchronizer.clone(),
            self.authenticator.clone(),
        )
        .with_engine(self.engine.clone())
    }
}

/// Configured authenticator, or this binary's own `host` subcommand reading the same config file.
fn authenticator_command(
    config: &GatewayConfig,
    config_path: Option<&Path>,
) -> Result<(PathBuf, Vec<String>)> {
    let authenticator = &config.spec.authenticator;
    if let Some(program) = &authenticator.program {
        return Ok((program.clone(), authenticator.args.clone()));
    }

    let own = std::env::current_exe().context("Failed to locate the guardian binary")?;
    let mut args = vec!["host".to_string()];
    if let Some(path) = config_path {
        let path = std::path::absolute(path)
            .with_context(|| format!("Failed to resolve config path {:?}", path))?;
        args.push("--config".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    Ok((own, args))
}
