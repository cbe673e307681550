// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `guardian host`
//!
//! Authenticator host over stdio. The gateway spawns this once per
//! authentication session; stdout carries protocol frames only.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use site_guardian_core::{
    gateway_config::GatewayConfig,
    infrastructure::authenticator::{verifier_from_config, AuthenticatorHost},
};

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let spec = &config.spec;

    let host = AuthenticatorHost::new(
        verifier_from_config(&spec.host.verifier),
        spec.authenticator.max_frame_length,
    );
    let answered = host
        .serve_stdio()
        .await
        .context("Authenticator host stopped on a protocol error")?;

    info!(answered, "Authenticator host exiting");
    Ok(())
}
