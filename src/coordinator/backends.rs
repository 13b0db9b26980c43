//! Connections from the coordinator to the backend stores
//!
//! Each backend has exactly one long-lived connection, shared by every
//! client session. A session checks the connection out for one complete
//! command cycle, so exchanges on the shared stream never interleave.
//! Connections that fail fatally or time out are discarded and dialled
//! again on the next checkout.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

use super::client::{ClientConfig, StoreClient};
use super::config::BackendAddrs;
use crate::error::{Error, Result};
use crate::router::Backend;

type Slot = Option<StoreClient<TcpStream>>;

// ============================================================================
// Backend Link
// ============================================================================

/// One backend's connection slot
#[derive(Debug)]
pub struct BackendLink {
    backend: Backend,
    config: ClientConfig,
    slot: Mutex<Slot>,
    dials: AtomicU64,
    discards: AtomicU64,
}

impl BackendLink {
    pub fn new(backend: Backend, config: ClientConfig) -> Self {
        Self {
            backend,
            config,
            slot: Mutex::new(None),
            dials: AtomicU64::new(0),
            discards: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Dial now unless already connected
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            *slot = Some(self.dial().await?);
        }
        Ok(())
    }

    /// Take exclusive use of the connection, dialling if needed.
    ///
    /// Waits while another session holds it.
    pub async fn checkout(&self) -> Result<LinkGuard<'_>> {
        let mut slot = self.slot.lock().await;
        let client = match slot.take() {
            Some(client) => client,
            None => self.dial().await?,
        };
        Ok(LinkGuard {
            link: self,
            slot,
            client,
        })
    }

    pub async fn status(&self) -> LinkStatus {
        LinkStatus {
            backend: self.backend,
            address: self.config.server.clone(),
            connected: self.slot.lock().await.is_some(),
            dials: self.dials.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
        }
    }

    async fn dial(&self) -> Result<StoreClient<TcpStream>> {
        let client = StoreClient::connect(&self.config).await?;
        let dials = self.dials.fetch_add(1, Ordering::Relaxed) + 1;
        if dials > 1 {
            tracing::info!(backend = %self.backend, address = %self.config.server, "reconnected to backend");
        } else {
            tracing::info!(backend = %self.backend, address = %self.config.server, "connected to backend");
        }
        Ok(client)
    }
}

/// Exclusive use of a backend connection for one command cycle
pub struct LinkGuard<'a> {
    link: &'a BackendLink,
    slot: MutexGuard<'a, Slot>,
    client: StoreClient<TcpStream>,
}

impl LinkGuard<'_> {
    pub fn client(&mut self) -> &mut StoreClient<TcpStream> {
        &mut self.client
    }

    /// Return the connection, or discard it if `outcome` left the stream
    /// in an unknown state. Dropping the guard without releasing discards.
    pub fn release<T>(self, outcome: &Result<T>) {
        let LinkGuard {
            link,
            mut slot,
            client,
        } = self;

        match outcome {
            Err(e) if e.is_fatal() || matches!(e, Error::Timeout) => {
                link.discards.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(backend = %link.backend, error = %e, "dropping backend connection");
                drop(client);
            }
            _ => *slot = Some(client),
        }
    }
}

/// Snapshot of a backend connection
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub backend: Backend,
    pub address: String,
    pub connected: bool,
    pub dials: u64,
    pub discards: u64,
}

// ============================================================================
// Backend Pool
// ============================================================================

/// The coordinator's connections, one per backend
#[derive(Debug)]
pub struct BackendPool {
    text: BackendLink,
    pdf: BackendLink,
}

impl BackendPool {
    /// Build without dialling
    pub fn new(addrs: &BackendAddrs, template: &ClientConfig) -> Self {
        let link = |backend, server: &str| {
            let mut config = template.clone();
            config.server = server.to_string();
            BackendLink::new(backend, config)
        };
        Self {
            text: link(Backend::Text, &addrs.text),
            pdf: link(Backend::Pdf, &addrs.pdf),
        }
    }

    /// Build and dial every backend. Fails if any is unreachable.
    pub async fn connect(addrs: &BackendAddrs, template: &ClientConfig) -> Result<Self> {
        let pool = Self::new(addrs, template);
        for backend in Backend::all() {
            pool.link(backend)
                .connect()
                .await
                .map_err(|e| Error::backend(backend, e))?;
        }
        Ok(pool)
    }

    pub fn link(&self, backend: Backend) -> &BackendLink {
        match backend {
            Backend::Text => &self.text,
            Backend::Pdf => &self.pdf,
        }
    }

    pub async fn checkout(&self, backend: Backend) -> Result<LinkGuard<'_>> {
        self.link(backend).checkout().await
    }

    pub async fn status(&self) -> Vec<LinkStatus> {
        vec![self.text.status().await, self.pdf.status().await]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Reply;
    use crate::transfer::{Channel, ACK};
    use tokio::net::TcpListener;

    /// Accept connections and answer every command with `OK <n>`
    async fn echo_node() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let mut n = 0;
            while let Ok((stream, _)) = listener.accept().await {
                let mut channel = Channel::new(stream);
                while channel.receive_then_acknowledge(ACK).await.is_ok() {
                    n += 1;
                    if channel.send_frame(&Reply::ok(n.to_string()).encode()).await.is_err() {
                        break;
                    }
                }
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_connect_fails_when_backend_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (live, _node) = echo_node().await;
        let addrs = BackendAddrs {
            text: live,
            pdf: dead,
        };
        let result = BackendPool::connect(&addrs, &ClientConfig::new("")).await;
        assert!(matches!(
            result,
            Err(Error::Backend {
                backend: Backend::Pdf,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_checkout_reuses_connection() {
        let (text, _t) = echo_node().await;
        let (pdf, _p) = echo_node().await;
        let pool = BackendPool::connect(&BackendAddrs { text, pdf }, &ClientConfig::new(""))
            .await
            .unwrap();

        for expected in ["1", "2"] {
            let mut guard = pool.checkout(Backend::Text).await.unwrap();
            let outcome = guard.client().delete("a.txt").await;
            assert_eq!(outcome.as_deref().unwrap(), expected);
            guard.release(&outcome);
        }

        let status = pool.link(Backend::Text).status().await;
        assert!(status.connected);
        assert_eq!(status.dials, 1);
    }

    #[tokio::test]
    async fn test_timeout_discards_connection() {
        let (text, _t) = echo_node().await;
        let (pdf, _p) = echo_node().await;
        let pool = BackendPool::connect(&BackendAddrs { text, pdf }, &ClientConfig::new(""))
            .await
            .unwrap();

        let guard = pool.checkout(Backend::Pdf).await.unwrap();
        guard.release::<()>(&Err(Error::Timeout));

        let status = pool.link(Backend::Pdf).status().await;
        assert!(!status.connected);
        assert_eq!(status.discards, 1);

        // Next checkout dials again
        let mut guard = pool.checkout(Backend::Pdf).await.unwrap();
        let outcome = guard.client().delete("a.pdf").await;
        assert!(outcome.is_ok());
        guard.release(&outcome);
        assert_eq!(pool.link(Backend::Pdf).status().await.dials, 2);
    }

    #[tokio::test]
    async fn test_remote_errors_keep_connection() {
        let (text, _t) = echo_node().await;
        let (pdf, _p) = echo_node().await;
        let pool = BackendPool::connect(&BackendAddrs { text, pdf }, &ClientConfig::new(""))
            .await
            .unwrap();

        let guard = pool.checkout(Backend::Text).await.unwrap();
        guard.release::<()>(&Err(Error::Remote("not found".into())));
        assert!(pool.link(Backend::Text).status().await.connected);
    }
}
