//! Configuration management for shardstore nodes
//!
//! Settings come from a TOML file or from `SHARDSTORE_*` environment
//! variables, and command-line flags override either. One file describes
//! the whole cluster; each node picks its own section with
//! [`Config::node_config`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::coordinator::{BackendAddrs, NodeConfig, NodeRole};
use crate::transfer::MAX_FRAME_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator node
    pub coordinator: CoordinatorSection,

    /// Text backend node
    pub text: StoreSection,

    /// Pdf backend node
    pub pdf: StoreSection,

    /// Settings shared by every node
    pub transfer: TransferConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Per-node storage settings. Unset fields take the role's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Listen address
    pub bind_address: Option<String>,

    /// Namespace root
    pub root: Option<PathBuf>,

    /// Archive output directory
    pub archive_dir: Option<PathBuf>,

    /// Staging directory for relayed transfers
    pub staging_dir: Option<PathBuf>,
}

/// Coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    #[serde(flatten)]
    pub store: StoreSection,

    /// Text backend address, `host:port`
    pub text_backend: String,

    /// Pdf backend address, `host:port`
    pub pdf_backend: String,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        let backends = BackendAddrs::default();
        Self {
            store: StoreSection::default(),
            text_backend: backends.text,
            pdf_backend: backends.pdf,
        }
    }
}

/// Transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Deadline for one forwarded backend operation, in seconds
    pub command_timeout_secs: Option<u64>,

    /// Deadline for dialling a peer, in seconds
    pub connect_timeout_secs: u64,

    /// Control frame size limit in bytes
    pub max_frame: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: None,
            connect_timeout_secs: 5,
            max_frame: MAX_FRAME_SIZE,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("SHARDSTORE_{name}")).ok()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        for (prefix, section) in [
            ("COORDINATOR", &mut config.coordinator.store),
            ("TEXT", &mut config.text),
            ("PDF", &mut config.pdf),
        ] {
            section.bind_address = env_var(&format!("{prefix}_BIND"));
            section.root = env_var(&format!("{prefix}_ROOT")).map(PathBuf::from);
            section.staging_dir = env_var(&format!("{prefix}_STAGING_DIR")).map(PathBuf::from);
            section.archive_dir = env_var("ARCHIVE_DIR").map(PathBuf::from);
        }

        if let Some(addr) = env_var("TEXT_BACKEND") {
            config.coordinator.text_backend = addr;
        }
        if let Some(addr) = env_var("PDF_BACKEND") {
            config.coordinator.pdf_backend = addr;
        }

        if let Some(secs) = env_var("COMMAND_TIMEOUT") {
            config.transfer.command_timeout_secs = Some(
                secs.parse()
                    .with_context(|| format!("Invalid SHARDSTORE_COMMAND_TIMEOUT: {secs}"))?,
            );
        }
        if let Some(secs) = env_var("CONNECT_TIMEOUT") {
            config.transfer.connect_timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid SHARDSTORE_CONNECT_TIMEOUT: {secs}"))?;
        }
        if let Some(bytes) = env_var("MAX_FRAME") {
            config.transfer.max_frame = bytes
                .parse()
                .with_context(|| format!("Invalid SHARDSTORE_MAX_FRAME: {bytes}"))?;
        }

        if let Some(level) = env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for role in [NodeRole::Coordinator, NodeRole::Text, NodeRole::Pdf] {
            self.node_config(role)
                .with_context(|| format!("Invalid {role} configuration"))?;
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be text or json, got {}", self.logging.format);
        }

        Ok(())
    }

    /// Resolved, validated settings for one node
    pub fn node_config(&self, role: NodeRole) -> Result<NodeConfig> {
        let section = match role {
            NodeRole::Coordinator => &self.coordinator.store,
            NodeRole::Text => &self.text,
            NodeRole::Pdf => &self.pdf,
        };

        let mut builder = NodeConfig::builder(role)
            .connect_timeout_secs(self.transfer.connect_timeout_secs)
            .max_frame(self.transfer.max_frame);

        if let Some(addr) = &section.bind_address {
            builder = builder.bind_address_str(addr)?;
        }
        if let Some(root) = &section.root {
            builder = builder.root(root);
        }
        if let Some(dir) = &section.archive_dir {
            builder = builder.archive_dir(dir);
        }
        if let Some(dir) = &section.staging_dir {
            builder = builder.staging_dir(dir);
        }

        if let Some(secs) = self.transfer.command_timeout_secs {
            builder = builder.command_timeout_secs(secs);
        }
        if role.is_coordinator() {
            builder = builder.backends(&self.coordinator.text_backend, &self.coordinator.pdf_backend);
        }

        Ok(builder.build()?)
    }
}
