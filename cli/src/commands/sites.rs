// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Controlled site management commands
//!
//! Commands: list, add, remove

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use site_guardian_core::{controlled_domain::ControlledDomain, gateway_config::GatewayConfig};

use crate::gateway::GatewayServices;

#[derive(Subcommand)]
pub enum SitesCommand {
    /// List controlled sites
    List,

    /// Put a site behind the authentication challenge
    Add {
        /// Domain or URL (e.g. bank.com, https://www.bank.com/login)
        domain: String,
    },

    /// Stop controlling a site (requires authentication)
    Remove {
        /// Domain or URL
        domain: String,
    },
}

pub async fn handle_command(command: SitesCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_path.clone())
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    let services = GatewayServices::from_config(&config, config_path.as_deref())?;

    match command {
        SitesCommand::List => {
            let sites = services.domains.list().await;
            print_sites(&sites);
        }
        SitesCommand::Add { domain } => {
            let sites = services
                .domains
                .add(&domain)
                .await
                .with_context(|| format!("Failed to add '{}'", domain))?;
            println!("{}", format!("✓ Controlling {}", domain).green());
            print_sites(&sites);
        }
        SitesCommand::Remove { domain } => {
            let sites = services
                .domains
                .remove(&domain)
                .await
                .with_context(|| format!("Failed to remove '{}'", domain))?;
            println!("{}", format!("✓ No longer controlling {}", domain).green());
            print_sites(&sites);
        }
    }

    Ok(())
}

fn print_sites(sites: &[ControlledDomain]) {
    if sites.is_empty() {
        println!("{}", "No controlled sites".dimmed());
        return;
    }
    println!("{}", "Controlled sites:".bold());
    for site in sites {
        println!("  - {}", site);
    }
}
