//! Per-connection command loop
//!
//! One [`Session`] serves one connected peer until it disconnects:
//!
//! ```text
//!   AwaitCommand ──frame──▶ Dispatching ──▶ StreamingIn / StreamingOut /
//!        ▲                                  Listing / Archiving
//!        └────────────────── reply ◀────────────────┘
//! ```
//!
//! A failed command costs the peer one `ERR` reply. Only a broken stream
//! ends the session.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;
use crate::protocol::{Command, Operation, ProtocolError, Reply};
use crate::router::Router;
use crate::transfer::{Channel, ChannelError, ACK};

/// Where a session is in its command cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitCommand,
    Dispatching,
    StreamingIn,
    StreamingOut,
    Listing,
    Archiving,
    Closed,
}

impl SessionState {
    fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Upload => Self::StreamingIn,
            Operation::Download => Self::StreamingOut,
            Operation::Delete => Self::Dispatching,
            Operation::List => Self::Listing,
            Operation::Archive => Self::Archiving,
        }
    }
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub commands: u64,
    pub failures: u64,
}

/// Serves commands from one peer
pub struct Session<S> {
    peer: String,
    channel: Channel<S>,
    router: Arc<Router>,
    state: SessionState,
    stats: SessionStats,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(peer: impl Into<String>, channel: Channel<S>, router: Arc<Router>) -> Self {
        Self {
            peer: peer.into(),
            channel,
            router,
            state: SessionState::AwaitCommand,
            stats: SessionStats::default(),
        }
    }

    /// Serve until the peer disconnects or the stream breaks
    pub async fn run(mut self) -> SessionStats {
        tracing::info!(peer = %self.peer, "client connected");

        loop {
            self.state = SessionState::AwaitCommand;
            let frame = match self.channel.receive_raw_then_acknowledge(ACK).await {
                Ok(frame) => frame,
                Err(ChannelError::Closed) => break,
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "failed to read command");
                    break;
                }
            };

            if let Err(e) = self.step(frame).await {
                tracing::warn!(
                    peer = %self.peer,
                    state = ?self.state,
                    category = e.category().as_str(),
                    error = %e,
                    "session stream broken"
                );
                break;
            }
        }

        self.state = SessionState::Closed;
        tracing::info!(
            peer = %self.peer,
            commands = self.stats.commands,
            failures = self.stats.failures,
            "client disconnected"
        );
        self.stats
    }

    /// Execute one acknowledged command and reply. Errors only when the
    /// stream can no longer be used.
    async fn step(&mut self, frame: Vec<u8>) -> Result<(), Error> {
        self.stats.commands += 1;
        self.state = SessionState::Dispatching;

        let text = String::from_utf8_lossy(&frame);
        let decoded = match std::str::from_utf8(&frame) {
            Ok(text) => Command::parse(text),
            Err(_) => Err(ProtocolError::InvalidEncoding),
        };

        let outcome = match decoded {
            Ok(command) => {
                self.state = SessionState::for_operation(command.operation());
                tracing::debug!(peer = %self.peer, command = %command, "dispatching");
                self.router.execute(&command, &mut self.channel).await
            }
            Err(e) => Err(e.into()),
        };

        let reply = match outcome {
            Ok(message) => Reply::ok(message),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(
                    peer = %self.peer,
                    command = %text,
                    category = e.category().as_str(),
                    error = %e,
                    "command failed"
                );
                Reply::err(e.to_string())
            }
        };

        let frame = reply.encode_within(self.channel.max_frame());
        self.channel.send_frame(&frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::LocalOnly;
    use crate::store::{StagingArea, StoreEngine};
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    async fn session(dir: &TempDir) -> (Channel<DuplexStream>, tokio::task::JoinHandle<SessionStats>) {
        let (stream, handle) = session_stream(dir).await;
        (Channel::new(stream), handle)
    }

    async fn session_stream(dir: &TempDir) -> (DuplexStream, tokio::task::JoinHandle<SessionStats>) {
        let store = StoreEngine::new(dir.path().join("root"), dir.path().join("tar"));
        store.init().await.unwrap();
        let router = Arc::new(Router::new(
            store,
            StagingArea::new(dir.path().join("staging")),
            Arc::new(LocalOnly),
        ));

        let (a, b) = duplex(64 * 1024);
        let handle = tokio::spawn(Session::new("test", Channel::new(b), router).run());
        (a, handle)
    }

    #[tokio::test]
    async fn test_invalid_command_keeps_session_open() {
        let dir = TempDir::new().unwrap();
        let (mut peer, handle) = session(&dir).await;

        assert_eq!(peer.exchange("bogus thing").await.unwrap(), ACK);
        let reply = Reply::parse(&peer.recv_frame().await.unwrap());
        assert!(!reply.is_ok());
        assert!(reply.message().contains("bogus"));

        // Wrong arity is rejected too, and the session still answers.
        assert_eq!(peer.exchange("delete a.c b.c").await.unwrap(), ACK);
        assert!(!Reply::parse(&peer.recv_frame().await.unwrap()).is_ok());

        std::fs::write(dir.path().join("root/a.c"), b"x").unwrap();
        assert_eq!(peer.exchange("delete a.c").await.unwrap(), ACK);
        assert_eq!(
            Reply::parse(&peer.recv_frame().await.unwrap()),
            Reply::ok("File removed")
        );

        drop(peer);
        let stats = handle.await.unwrap();
        assert_eq!(stats, SessionStats { commands: 3, failures: 2 });
    }

    #[tokio::test]
    async fn test_undecodable_command_keeps_session_open() {
        let dir = TempDir::new().unwrap();
        let (mut stream, handle) = session_stream(&dir).await;

        stream.write_all(b"delete \xff\xfe.c\0").await.unwrap();
        let mut peer = Channel::new(stream);
        assert_eq!(peer.recv_frame().await.unwrap(), ACK);
        let reply = Reply::parse(&peer.recv_frame().await.unwrap());
        assert!(!reply.is_ok());
        assert!(reply.message().contains("UTF-8"));

        std::fs::write(dir.path().join("root/a.c"), b"x").unwrap();
        assert_eq!(peer.exchange("delete a.c").await.unwrap(), ACK);
        assert!(Reply::parse(&peer.recv_frame().await.unwrap()).is_ok());

        drop(peer);
        let stats = handle.await.unwrap();
        assert_eq!(stats, SessionStats { commands: 2, failures: 1 });
    }

    #[tokio::test]
    async fn test_legacy_verbs_accepted() {
        let dir = TempDir::new().unwrap();
        let (mut peer, handle) = session(&dir).await;

        assert_eq!(peer.exchange("display /").await.unwrap(), ACK);
        assert_eq!(peer.recv_sized_bytes().await.unwrap(), Some(Vec::new()));
        assert!(Reply::parse(&peer.recv_frame().await.unwrap()).is_ok());

        drop(peer);
        assert_eq!(handle.await.unwrap().failures, 0);
    }

    #[tokio::test]
    async fn test_peer_vanishing_mid_upload_ends_session() {
        let dir = TempDir::new().unwrap();
        let (mut peer, handle) = session(&dir).await;

        assert_eq!(peer.exchange("upload a.c 100 x").await.unwrap(), ACK);
        assert_eq!(peer.exchange("100").await.unwrap(), ACK);
        drop(peer);

        let stats = handle.await.unwrap();
        assert_eq!(stats.commands, 1);
        assert!(!dir.path().join("root/x/a.c").exists());
    }

    #[tokio::test]
    async fn test_oversized_error_reply_is_truncated() {
        let dir = TempDir::new().unwrap();
        let (mut peer, handle) = session(&dir).await;

        let long = format!("{}.c", "n".repeat(1013));
        assert_eq!(peer.exchange(&format!("delete {long}")).await.unwrap(), ACK);
        let frame = peer.recv_frame().await.unwrap();
        assert!(frame.len() <= crate::transfer::MAX_FRAME_SIZE);
        assert!(frame.starts_with("ERR"));

        drop(peer);
        handle.await.unwrap();
    }
}
