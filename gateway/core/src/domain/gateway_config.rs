// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration manifest for a Site Guardian gateway:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Authenticator process and session timeout
// - Admin authorization cache window
// - Redirect engine quota, reconcile strategy and challenge page
// - Domain list storage location
// - Authenticator host verifier

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "site-guardian/v1";
pub const KIND: &str = "GatewayConfig";

/// Smallest accepted `spec.authenticator.max_frame_length`. A challenge with a
/// full-length domain and its reason must fit.
pub const MIN_FRAME_LENGTH: usize = 1024;

/// Top-level gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "site-guardian/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GatewayConfigSpec,
}

/// Convenience alias used throughout the gateway
pub type GatewayConfig = GatewayConfigManifest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable gateway name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub authenticator: AuthenticatorConfig,

    #[serde(default)]
    pub admin_auth: AdminAuthConfig,

    #[serde(default)]
    pub rules: RuleEngineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatorConfig {
    /// Authenticator executable speaking the framed JSON protocol on stdio.
    /// Default: the running `guardian` binary with `host` as its first argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,

    #[serde(default)]
    pub args: Vec<String>,

    /// How long one challenge may wait for an answer
    #[serde(default = "default_auth_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Largest accepted frame body in bytes
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec![],
            timeout: default_auth_timeout(),
            max_frame_length: default_max_frame_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAuthConfig {
    /// Validity of a successful administrative authentication
    #[serde(default = "default_admin_window", with = "humantime_serde")]
    pub window: Duration,
}

impl Default for AdminAuthConfig {
    fn default() -> Self {
        Self {
            window: default_admin_window(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileStrategy {
    /// Only touch rules in the symmetric difference of desired and installed
    #[default]
    Diff,
    /// Remove every owned block rule and re-add the desired set
    FullRebuild,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEngineConfig {
    /// Rule-count quota of the in-process redirect engine
    #[serde(default = "default_max_rules")]
    pub max_rules: usize,

    #[serde(default)]
    pub strategy: ReconcileStrategy,

    /// Page blocked navigations are redirected to
    #[serde(default = "default_challenge_page")]
    pub challenge_page: String,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            max_rules: default_max_rules(),
            strategy: ReconcileStrategy::default(),
            challenge_page: default_challenge_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the settings mapping. Default: ~/.guardian/settings.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// How often `guardian serve` checks the file for changes made by other processes
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval: default_poll_interval(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".guardian")
                .join("settings.json")
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub verifier: VerifierConfig,
}

/// How `guardian host` decides a challenge
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerifierConfig {
    /// Run a command; exit status 0 means verified. `{reason}` and `{domain}` are substituted in args.
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Accept every challenge (development only)
    Allow,
    /// Refuse every challenge
    #[default]
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_auth_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_frame_length() -> usize {
    1024 * 1024
}

fn default_admin_window() -> Duration {
    Duration::from_secs(60)
}

fn default_max_rules() -> usize {
    5000
}

fn default_challenge_page() -> String {
    "guardian://gate".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "site-guardian".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. GUARDIAN_CONFIG_PATH environment variable
    /// 2. ./guardian-config.yaml (working directory)
    /// 3. ~/.guardian/config.yaml (user home)
    /// 4. /etc/guardian/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GUARDIAN_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./guardian-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".guardian").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/guardian/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GUARDIAN_AUTHENTICATOR_PROGRAM") {
            tracing::info!("Environment override: GUARDIAN_AUTHENTICATOR_PROGRAM={}", val);
            self.spec.authenticator.program = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("GUARDIAN_AUTH_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(timeout) => {
                    tracing::info!("Environment override: GUARDIAN_AUTH_TIMEOUT={}", val);
                    self.spec.authenticator.timeout = timeout;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for GUARDIAN_AUTH_TIMEOUT: '{}' ({}). Ignoring.",
                        val,
                        e
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("GUARDIAN_STORE_PATH") {
            tracing::info!("Environment override: GUARDIAN_STORE_PATH={}", val);
            self.spec.storage.path = Some(PathBuf::from(val));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.authenticator.timeout.is_zero() {
            anyhow::bail!("spec.authenticator.timeout must be greater than zero");
        }

        if self.spec.authenticator.max_frame_length < MIN_FRAME_LENGTH {
            anyhow::bail!(
                "spec.authenticator.max_frame_length must be at least {} bytes",
                MIN_FRAME_LENGTH
            );
        }

        if self.spec.storage.poll_interval.is_zero() {
            anyhow::bail!("spec.storage.poll_interval must be greater than zero");
        }

        if self.spec.rules.max_rules == 0 {
            anyhow::bail!("spec.rules.max_rules must be greater than zero");
        }

        if self.spec.rules.challenge_page.trim().is_empty() {
            anyhow::bail!("spec.rules.challenge_page cannot be empty");
        }

        if let VerifierConfig::Command { program, .. } = &self.spec.host.verifier {
            if program.as_os_str().is_empty() {
                anyhow::bail!("spec.host.verifier.program cannot be empty");
            }
        }

        Ok(())
    }
}
