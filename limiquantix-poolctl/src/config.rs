//! Configuration management for the pool controller.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use limiquantix_pool::PoolSpec;

use crate::cli::Args;

/// Manifest location used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/pools.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to reach virsh
    pub virsh: VirshConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Watch-mode configuration
    pub watch: WatchConfig,
    /// Desired storage pools
    pub pools: Vec<PoolSpec>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject duplicate or unusable pool entries.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.pools {
            spec.validate()
                .with_context(|| format!("Invalid pool entry '{}'", spec.name))?;
            if !seen.insert(spec.name.as_str()) {
                bail!("Pool '{}' is declared more than once", spec.name);
            }
        }

        if self.watch.interval_secs == 0 {
            bail!("watch.interval_secs must be greater than zero");
        }

        Ok(())
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref uri) = args.connect {
            self.virsh.connect_uri = Some(uri.clone());
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.log_json {
            self.logging.format = LogFormat::Json;
        }

        if args.dev {
            self.virsh.backend = VirshBackend::Mock;
        }

        self
    }

    /// Look up a manifest entry by name.
    pub fn pool(&self, name: &str) -> Option<&PoolSpec> {
        self.pools.iter().find(|p| p.name == name)
    }
}

/// virsh invocation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VirshConfig {
    /// Backend type
    pub backend: VirshBackend,
    /// virsh binary path
    pub binary: String,
    /// Libvirt connection URI (virsh default when unset)
    pub connect_uri: Option<String>,
}

impl Default for VirshConfig {
    fn default() -> Self {
        Self {
            backend: VirshBackend::Virsh,
            binary: "virsh".to_string(),
            connect_uri: None,
        }
    }
}

/// Which command runner drives the pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirshBackend {
    /// Real virsh processes
    #[default]
    Virsh,
    /// In-memory mock for development
    Mock,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Watch-mode configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Seconds between reconciliation passes
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}
