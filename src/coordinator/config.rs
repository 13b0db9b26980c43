//! Node configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::router::{ByExtension, LocalOnly, RoutingRule};
use crate::transfer::MAX_FRAME_SIZE;

/// Smallest control frame limit a node accepts
pub const MIN_FRAME_SIZE: usize = 64;

// ============================================================================
// Node Role
// ============================================================================

/// What a node serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Client-facing node that shards by extension
    Coordinator,
    /// Backend holding `.txt` files
    Text,
    /// Backend holding `.pdf` files
    Pdf,
}

impl NodeRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Text => "text",
            Self::Pdf => "pdf",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Coordinator => 4020,
            Self::Text => 4014,
            Self::Pdf => 4015,
        }
    }

    /// Namespace root used when none is configured
    pub fn default_root(&self) -> PathBuf {
        match self {
            Self::Coordinator => PathBuf::from("./smain"),
            Self::Text => PathBuf::from("./stext"),
            Self::Pdf => PathBuf::from("./spdf"),
        }
    }

    /// Routing strategy for this role
    pub fn routing_rule(&self) -> Arc<dyn RoutingRule> {
        match self {
            Self::Coordinator => Arc::new(ByExtension),
            Self::Text | Self::Pdf => Arc::new(LocalOnly),
        }
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self, Self::Coordinator)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" | "main" => Ok(Self::Coordinator),
            "text" | "txt" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            other => Err(ConfigError::InvalidValue {
                field: "role".to_string(),
                reason: format!("Unknown role: {}", other),
            }),
        }
    }
}

// ============================================================================
// Node Config
// ============================================================================

/// Addresses of the backend stores a coordinator forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAddrs {
    pub text: String,
    pub pdf: String,
}

impl Default for BackendAddrs {
    fn default() -> Self {
        Self {
            text: format!("127.0.0.1:{}", NodeRole::Text.default_port()),
            pdf: format!("127.0.0.1:{}", NodeRole::Pdf.default_port()),
        }
    }
}

/// Configuration for one node of the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Role served by this node
    pub role: NodeRole,

    /// Listen address
    pub bind_address: SocketAddr,

    /// Namespace root
    pub root: PathBuf,

    /// Where archives are written
    pub archive_dir: PathBuf,

    /// Scratch space for relayed transfers
    pub staging_dir: PathBuf,

    /// Backend stores (coordinator only)
    pub backends: Option<BackendAddrs>,

    /// Deadline for one forwarded backend operation (none when unset)
    pub command_timeout_secs: Option<u64>,

    /// Deadline for dialling a peer
    pub connect_timeout_secs: u64,

    /// Control frame size limit
    pub max_frame: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_role(NodeRole::Coordinator)
    }
}

impl NodeConfig {
    /// Defaults for a role
    pub fn for_role(role: NodeRole) -> Self {
        Self {
            role,
            bind_address: SocketAddr::from(([0, 0, 0, 0], role.default_port())),
            root: role.default_root(),
            archive_dir: PathBuf::from("./tar"),
            staging_dir: PathBuf::from("./staging").join(role.name()),
            backends: role.is_coordinator().then(BackendAddrs::default),
            command_timeout_secs: None,
            connect_timeout_secs: 5,
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Create a new config builder
    pub fn builder(role: NodeRole) -> NodeConfigBuilder {
        NodeConfigBuilder::new(role)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "root".to_string(),
            });
        }

        if self.staging_dir.starts_with(&self.root) {
            return Err(ConfigError::InvalidValue {
                field: "staging_dir".to_string(),
                reason: "Must be outside the namespace root".to_string(),
            });
        }

        match (self.role.is_coordinator(), &self.backends) {
            (true, None) => {
                return Err(ConfigError::MissingField {
                    field: "backends".to_string(),
                })
            }
            (false, Some(_)) => {
                return Err(ConfigError::InvalidValue {
                    field: "backends".to_string(),
                    reason: format!("A {} store does not forward", self.role),
                })
            }
            _ => {}
        }

        if self.command_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "command_timeout_secs".to_string(),
                reason: "Must be at least 1 second".to_string(),
            });
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_secs".to_string(),
                reason: "Must be at least 1 second".to_string(),
            });
        }

        if self.max_frame < MIN_FRAME_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "max_frame".to_string(),
                reason: format!("Must be at least {} bytes", MIN_FRAME_SIZE),
            });
        }

        Ok(())
    }
}

/// Builder for NodeConfig
#[derive(Debug)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    fn new(role: NodeRole) -> Self {
        Self {
            config: NodeConfig::for_role(role),
        }
    }

    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.config.bind_address = addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_address".to_string(),
            reason: format!("Invalid address: {}", addr),
        })?;
        Ok(self)
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.archive_dir = dir.into();
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    /// Set backend addresses
    pub fn backends(mut self, text: impl Into<String>, pdf: impl Into<String>) -> Self {
        self.config.backends = Some(BackendAddrs {
            text: text.into(),
            pdf: pdf.into(),
        });
        self
    }

    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.command_timeout_secs = Some(secs);
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn max_frame(mut self, max_frame: usize) -> Self {
        self.config.max_frame = max_frame;
        self
    }

    /// Build the config
    pub fn build(self) -> Result<NodeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
    MissingField { field: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            Self::MissingField { field } => {
                write!(f, "Missing required field: {}", field)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
