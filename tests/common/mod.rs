//! Common test utilities

use std::net::SocketAddr;
use std::path::PathBuf;

use shardstore::coordinator::{
    ClientConfig, NodeConfig, NodeRole, NodeServer, ServerError, StoreClient,
};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running node and the means to stop it
pub struct Node {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl Node {
    pub async fn start(config: NodeConfig) -> Self {
        let server = NodeServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            stop: Some(stop),
            handle,
        }
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

/// Coordinator plus text and pdf stores on loopback ephemeral ports
pub struct Cluster {
    pub dir: TempDir,
    pub coordinator: Node,
    pub text: Node,
    pub pdf: Node,
}

impl Cluster {
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap();

        let text = Node::start(node_config(&dir, NodeRole::Text).build().unwrap()).await;
        let pdf = Node::start(node_config(&dir, NodeRole::Pdf).build().unwrap()).await;

        let config = node_config(&dir, NodeRole::Coordinator)
            .backends(text.addr.to_string(), pdf.addr.to_string())
            .command_timeout_secs(10)
            .build()
            .unwrap();
        let coordinator = Node::start(config).await;

        Self {
            dir,
            coordinator,
            text,
            pdf,
        }
    }

    pub async fn client(&self) -> StoreClient<TcpStream> {
        StoreClient::connect(&ClientConfig::new(self.coordinator.addr.to_string()))
            .await
            .unwrap()
    }

    /// Namespace root of a node
    pub fn root(&self, role: NodeRole) -> PathBuf {
        self.dir.path().join(role.name())
    }

    /// Staging directory of a node
    pub fn staging(&self, role: NodeRole) -> PathBuf {
        self.dir.path().join("staging").join(role.name())
    }

    pub async fn stop(self) {
        self.coordinator.stop().await;
        self.text.stop().await;
        self.pdf.stop().await;
    }
}

fn node_config(dir: &TempDir, role: NodeRole) -> shardstore::coordinator::config::NodeConfigBuilder {
    NodeConfig::builder(role)
        .bind_address_str("127.0.0.1:0")
        .unwrap()
        .root(dir.path().join(role.name()))
        .archive_dir(dir.path().join("tar").join(role.name()))
        .staging_dir(dir.path().join("staging").join(role.name()))
        .connect_timeout_secs(2)
}

/// Deterministic payload of `len` bytes
#[allow(dead_code)]
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Number of entries in a directory, zero when absent
#[allow(dead_code)]
pub fn entry_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
