//! shardstore - distributed file store
//!
//! Clients talk to a single coordinator. The coordinator keeps most files
//! itself and transparently hands `.txt` and `.pdf` files to two backend
//! stores, so the client sees one namespace.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`transfer`] - control frames and sized transfers over one stream
//! - [`protocol`] - command and reply encoding
//! - [`store`] - file storage, listings and archives under a namespace root
//! - [`router`] - routing rules and command execution
//! - [`coordinator`] - node server, sessions, backend links and the client
//! - [`config`] - configuration from files and the environment
//! - [`error`] - the unified error type
//!
//! # Example
//!
//! ```no_run
//! use shardstore::coordinator::{ClientConfig, StoreClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = StoreClient::connect(&ClientConfig::new("127.0.0.1:4020")).await?;
//!     let listing = client.list("/").await?;
//!     print!("{listing}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod router;
pub mod store;
pub mod transfer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{ClientConfig, NodeConfig, NodeRole, NodeServer, StoreClient};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::protocol::{ArchiveKind, Command, Reply};
    pub use crate::router::{Backend, Router, Target};
    pub use crate::store::StoreEngine;
    pub use crate::transfer::Channel;
}
