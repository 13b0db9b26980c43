//! Node runtime
//!
//! Everything a running node needs around the router: configuration, the
//! listener, per-connection sessions, and the client used both by the
//! interactive shell and by the coordinator to reach its backend stores.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │              NodeServer              │
//! │   accept ──▶ Session (one per peer)  │
//! │                 │                    │
//! │                 ▼                    │
//! │              Router ──▶ StoreEngine  │
//! │                 │                    │
//! │                 ▼                    │
//! │            BackendPool               │
//! │   (coordinator only, one link each)  │
//! └─────────┬──────────────────┬─────────┘
//!           ▼                  ▼
//!      text store          pdf store
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use shardstore::coordinator::{NodeConfig, NodeRole, NodeServer};
//!
//! let config = NodeConfig::for_role(NodeRole::Text);
//! let server = NodeServer::bind(config).await?;
//! server.serve().await?;
//! ```

pub mod backends;
pub mod client;
pub mod config;
pub mod server;
pub mod session;

// Re-export main types
pub use backends::{BackendLink, BackendPool, LinkGuard, LinkStatus};
pub use client::{ClientConfig, StoreClient};
pub use config::{BackendAddrs, ConfigError, NodeConfig, NodeRole};
pub use server::{NodeServer, ServerError, ServerInfo};
pub use session::{Session, SessionState, SessionStats};
