// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use site_guardian_core::gateway_config::{GatewayConfig, VerifierConfig};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./guardian-config.yaml)
        #[arg(short, long, default_value = "./guardian-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;
    let spec = &config.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. GUARDIAN_CONFIG_PATH: {}",
            std::env::var("GUARDIAN_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./guardian-config.yaml");
        println!("  4. ~/.guardian/config.yaml");
        println!("  5. /etc/guardian/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Authenticator:".bold());
    match &spec.authenticator.program {
        Some(program) => println!("  Program: {}", program.display()),
        None => println!("  Program: {}", "guardian host (built-in)".dimmed()),
    }
    if !spec.authenticator.args.is_empty() {
        println!("  Args: {}", spec.authenticator.args.join(" "));
    }
    println!("  Timeout: {}s", spec.authenticator.timeout.as_secs());
    println!("  Admin window: {}s", spec.admin_auth.window.as_secs());
    println!();

    println!("{}", "Rules:".bold());
    println!("  Strategy: {:?}", spec.rules.strategy);
    println!("  Quota: {}", spec.rules.max_rules);
    println!("  Challenge page: {}", spec.rules.challenge_page);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Path: {}", spec.storage.resolved_path().display());
    println!("  Poll interval: {:?}", spec.storage.poll_interval);
    println!();

    println!("{}", "Host verifier:".bold());
    match &spec.host.verifier {
        VerifierConfig::Command { program, args } => {
            println!("  Command: {} {}", program.display(), args.join(" "))
        }
        VerifierConfig::Allow => println!("  {}", "allow (development only)".yellow()),
        VerifierConfig::Deny => println!("  deny"),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
