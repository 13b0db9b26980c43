//! Node server
//!
//! Binds the listener, prepares the store and (for the coordinator) the
//! backend connections, then runs one [`Session`] task per accepted peer.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use super::backends::{BackendPool, LinkStatus};
use super::client::ClientConfig;
use super::config::{NodeConfig, NodeRole};
use super::session::Session;
use crate::router::Router;
use crate::store::{StagingArea, StoreEngine};
use crate::transfer::Channel;

// ============================================================================
// Node Server
// ============================================================================

/// A bound, ready-to-serve node
pub struct NodeServer {
    config: NodeConfig,
    router: Arc<Router>,
    listener: TcpListener,
}

impl NodeServer {
    /// Prepare directories, dial backends, and bind.
    ///
    /// A coordinator fails here if either backend is unreachable.
    pub async fn bind(config: NodeConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|e| ServerError::ConfigError(e.to_string()))?;

        let store = StoreEngine::new(&config.root, &config.archive_dir);
        store
            .init()
            .await
            .map_err(|e| ServerError::InitError(e.to_string()))?;

        let staging = StagingArea::new(&config.staging_dir);
        staging
            .init()
            .await
            .map_err(|e| ServerError::InitError(e.to_string()))?;

        let mut router = Router::new(store, staging, config.role.routing_rule())
            .with_command_timeout(config.command_timeout());

        if let Some(addrs) = &config.backends {
            let template = ClientConfig::new("")
                .with_connect_timeout(config.connect_timeout())
                .with_max_frame(config.max_frame);
            let pool = BackendPool::connect(addrs, &template)
                .await
                .map_err(|e| ServerError::BackendError(e.to_string()))?;
            router = router.with_backends(Arc::new(pool));
        }

        let listener = TcpListener::bind(config.bind_address)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        Ok(Self {
            config,
            router: Arc::new(router),
            listener,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))
    }

    pub fn role(&self) -> NodeRole {
        self.config.role
    }

    /// Serve until the process is stopped
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` completes, then abort open sessions
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        tracing::info!(role = %self.config.role, %addr, root = %self.config.root.display(), "node listening");

        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(role = %self.config.role, "shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        let channel = Channel::new(stream).with_max_frame(self.config.max_frame);
                        let router = Arc::clone(&self.router);
                        sessions.spawn(Session::new(peer.to_string(), channel, router).run());
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "session task failed");
                    }
                }
            }
        }

        let open = sessions.len();
        sessions.shutdown().await;
        tracing::info!(role = %self.config.role, aborted_sessions = open, "node stopped");
        Ok(())
    }

    /// Get server info
    pub async fn info(&self) -> ServerInfo {
        let backends = match self.router.backends() {
            Some(pool) => pool.status().await,
            None => Vec::new(),
        };
        ServerInfo {
            role: self.config.role,
            bind_address: self.local_addr().unwrap_or(self.config.bind_address),
            root: self.config.root.display().to_string(),
            command_timeout_secs: self.config.command_timeout_secs,
            backends,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub role: NodeRole,
    pub bind_address: SocketAddr,
    pub root: String,
    pub command_timeout_secs: Option<u64>,
    pub backends: Vec<LinkStatus>,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut out = format!(
            "Node Server ({})\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Root: {}\n\
             Command Timeout: {}",
            self.role,
            "",
            self.bind_address,
            self.root,
            match self.command_timeout_secs {
                Some(secs) => format!("{}s", secs),
                None => "none".to_string(),
            }
        );
        for link in &self.backends {
            out.push_str(&format!(
                "\nBackend {}: {} ({})",
                link.backend,
                link.address,
                if link.connected { "connected" } else { "disconnected" }
            ));
        }
        out
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Configuration error
    ConfigError(String),

    /// Initialization error
    InitError(String),

    /// Backend store unreachable at startup
    BackendError(String),

    /// Failed to bind to address
    BindError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::InitError(msg) => write!(f, "Initialization error: {}", msg),
            Self::BackendError(msg) => write!(f, "Backend unavailable: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================
