//! Initiator side of the command protocol
//!
//! [`StoreClient`] drives one connection to any node. The interactive shell
//! uses it against the coordinator, and the coordinator uses it against the
//! backend stores. Every method runs one complete command cycle: command
//! exchange, the operation's transfer (if any), then the reply frame.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::{ArchiveKind, Command, Reply};
use crate::store::StorageError;
use crate::transfer::{Channel, ChannelError, Received, MAX_FRAME_SIZE};

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for a store client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Node address, `host:port`
    pub server: String,

    /// Deadline for establishing the connection
    pub connect_timeout: Duration,

    /// Control frame size limit
    pub max_frame: usize,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            connect_timeout: Duration::from_secs(5),
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }
}

// ============================================================================
// Store Client
// ============================================================================

/// How a download-shaped exchange ended
enum Concluded {
    /// Body received; the reply was `OK`
    Body(u64),
    /// Peer announced not-found; carries the reply's message
    Missing(String),
}

/// Client for one node connection
#[derive(Debug)]
pub struct StoreClient<S> {
    channel: Channel<S>,
}

impl StoreClient<TcpStream> {
    /// Connect to a node
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.server))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(ChannelError::from)?;
        let _ = stream.set_nodelay(true);

        tracing::debug!(server = %config.server, "connected");
        Ok(Self::new(
            Channel::new(stream).with_max_frame(config.max_frame),
        ))
    }
}

impl<S> StoreClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(channel: Channel<S>) -> Self {
        Self { channel }
    }

    /// Upload `size` bytes from `source` as `dest/name`
    pub async fn upload<R>(&mut self, name: &str, dest: &str, size: u64, source: R) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let command = Command::upload(name, size, dest)?;
        self.begin(&command).await?;
        self.channel.send_sized(size, source).await?;
        self.finish().await
    }

    /// Upload a local file as `dest/name`
    pub async fn upload_file(&mut self, name: &str, dest: &str, path: &Path) -> Result<String> {
        let open_err = |source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).await.map_err(open_err)?;
        let size = file.metadata().await.map_err(open_err)?.len();
        self.upload(name, dest, size, file).await
    }

    /// Download `path` into `sink`, returning the byte count
    pub async fn download<W>(&mut self, path: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let command = Command::download(path)?;
        self.begin(&command).await?;
        let received = self.channel.recv_sized(sink).await;
        match self.conclude(received).await? {
            Concluded::Body(n) => Ok(n),
            Concluded::Missing(reason) => {
                tracing::debug!(path, %reason, "download refused");
                Err(Error::not_found(path))
            }
        }
    }

    /// Delete `path`
    pub async fn delete(&mut self, path: &str) -> Result<String> {
        let command = Command::delete(path)?;
        self.begin(&command).await?;
        self.finish().await
    }

    /// Listing text for `path`. Empty when there are no files.
    pub async fn list(&mut self, path: &str) -> Result<String> {
        let command = Command::list(path)?;
        self.begin(&command).await?;

        let mut body = Vec::new();
        let received = self.channel.recv_sized(&mut body).await;
        match self.conclude(received).await? {
            Concluded::Body(_) => Ok(String::from_utf8_lossy(&body).into_owned()),
            Concluded::Missing(reason) => Err(Error::Remote(reason)),
        }
    }

    /// Fetch the archive of `kind` into `sink`
    pub async fn archive<W>(&mut self, kind: ArchiveKind, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        self.begin(&Command::archive(kind)).await?;
        let received = self.channel.recv_sized(sink).await;
        match self.conclude(received).await? {
            Concluded::Body(n) => Ok(n),
            Concluded::Missing(reason) => Err(Error::Remote(reason)),
        }
    }

    /// Send a command frame verbatim and return the reply.
    ///
    /// Only meaningful for frames the node rejects or for `delete`, which
    /// carry no transfer.
    pub async fn send_raw(&mut self, text: &str) -> Result<String> {
        self.channel.exchange(text).await?;
        self.finish().await
    }

    async fn begin(&mut self, command: &Command) -> Result<()> {
        tracing::trace!(command = %command, "sending command");
        self.channel.exchange(&command.encode()).await?;
        Ok(())
    }

    /// Read the reply frame
    async fn finish(&mut self) -> Result<String> {
        let frame = self.channel.recv_frame().await?;
        match Reply::parse(&frame) {
            Reply::Ok(message) => Ok(message),
            Reply::Err(message) => Err(Error::Remote(message)),
        }
    }

    /// Consume the reply after a sized transfer
    async fn conclude(&mut self, received: std::result::Result<Received, ChannelError>) -> Result<Concluded> {
        let received = match received {
            Ok(received) => received,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                // Local sink failed; the stream is still aligned.
                if let Err(reply_err) = self.finish().await {
                    if reply_err.is_fatal() {
                        return Err(reply_err);
                    }
                }
                return Err(e.into());
            }
        };

        match received {
            Received::Complete(n) => {
                self.finish().await?;
                Ok(Concluded::Body(n))
            }
            Received::NotFound => match self.finish().await {
                Ok(message) | Err(Error::Remote(message)) => Ok(Concluded::Missing(message)),
                Err(e) => Err(e),
            },
        }
    }
}
