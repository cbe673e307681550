// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Site Guardian CLI
//!
//! The `guardian` binary runs the access-control gateway and the
//! authenticator host it talks to.
//!
//! ## Commands
//!
//! - `guardian serve` - Run the gateway; JSON-lines requests on stdin, answers on stdout
//! - `guardian host` - Answer authentication challenges over stdio
//! - `guardian sites list|add|remove` - Manage controlled sites
//! - `guardian config show|validate|generate` - Configuration management
//!
//! Logs always go to stderr; stdout carries protocol traffic.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use site_guardian::commands::{self, ConfigCommand, SitesCommand};
use site_guardian_core::gateway_config::GatewayConfig;

/// Site Guardian - keep chosen sites behind an authentication challenge
#[derive(Parser)]
#[command(name = "guardian")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GUARDIAN_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Default: spec.logging.level
    #[arg(long, global = true, env = "GUARDIAN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json). Default: spec.logging.format
    #[arg(long, global = true, env = "GUARDIAN_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway on stdio
    #[command(name = "serve")]
    Serve,

    /// Run the authenticator host on stdio
    #[command(name = "host")]
    Host,

    /// Controlled site management
    #[command(name = "sites")]
    Sites {
        #[command(subcommand)]
        command: SitesCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings may come from the config file; a broken file is reported by the command itself.
    let logging = GatewayConfig::load_or_default(cli.config.clone())
        .map(|config| config.spec.logging)
        .unwrap_or_default();
    init_logging(
        cli.log_level.as_deref().unwrap_or(&logging.level),
        cli.log_format.as_deref().unwrap_or(&logging.format),
    )?;

    match cli.command {
        Some(Commands::Serve) => commands::serve::execute(cli.config).await,
        Some(Commands::Host) => commands::host::execute(cli.config).await,
        Some(Commands::Sites { command }) => {
            commands::sites::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
