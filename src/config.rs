use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::executor::DEFAULT_PARALLEL;
use crate::registry::Registry;
use crate::ssh_service::SSH_BINARY;

/// Environment variable pointing at an alternative hosts file.
pub const HOSTS_ENV: &str = "HOP_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ssh_binary: String,
    pub default_parallel: usize,
    /// Per-host timeout applied when `--timeout` is not given, e.g. `"30s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ssh_binary: SSH_BINARY.to_string(),
            default_parallel: DEFAULT_PARALLEL,
            default_timeout: None,
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    config_file: PathBuf,
    hosts_file: PathBuf,
}

impl ConfigManager {
    /// Paths under `<config dir>/hop`, with `$HOP_CONFIG` overriding the hosts file.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("hop");

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        let hosts_file = match std::env::var(HOSTS_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => config_dir.join("hosts.toml"),
        };

        Ok(Self {
            config_file: config_dir.join("config.toml"),
            hosts_file,
        })
    }

    pub fn with_paths(config_file: impl Into<PathBuf>, hosts_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            hosts_file: hosts_file.into(),
        }
    }

    pub fn with_hosts_file(mut self, hosts_file: impl Into<PathBuf>) -> Self {
        self.hosts_file = hosts_file.into();
        self
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        // If config file doesn't exist, create it with default values
        if !self.config_file.exists() {
            let default_config = AppConfig::default();
            self.save_config(&default_config)?;
            return Ok(default_config);
        }

        let content =
            fs::read_to_string(&self.config_file).context("Failed to read config file")?;

        let mut config: AppConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        if config.ssh_binary.trim().is_empty() {
            config.ssh_binary = SSH_BINARY.to_string();
        }

        Ok(config)
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml = toml::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_file, toml).context("Failed to write config file")?;
        Ok(())
    }

    /// Load and validate the connection registry. A missing hosts file is an empty registry.
    pub fn load_registry(&self) -> Result<Registry> {
        if !self.hosts_file.exists() {
            tracing::warn!("Hosts file not found at {:?}", self.hosts_file);
            return Ok(Registry::default());
        }

        let content = fs::read_to_string(&self.hosts_file)
            .with_context(|| format!("Failed to read hosts file {}", self.hosts_file.display()))?;

        let mut registry: Registry = toml::from_str(&content)
            .with_context(|| format!("Failed to parse hosts file {}", self.hosts_file.display()))?;

        registry.apply_defaults();

        if let Err(errs) = registry.validate() {
            tracing::warn!("Hosts file {:?} has {} problem(s)", self.hosts_file, errs.0.len());
            return Err(anyhow::Error::new(errs)
                .context(format!("invalid hosts file {}", self.hosts_file.display())));
        }

        tracing::info!(
            "Loaded {} connections and {} groups from {:?}",
            registry.connections.len(),
            registry.groups.len(),
            self.hosts_file
        );

        Ok(registry)
    }

    pub fn hosts_path(&self) -> &Path {
        &self.hosts_file
    }
}
