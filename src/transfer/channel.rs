//! Duplex channel with control-frame exchanges and sized transfers

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use super::error::ChannelError;
use super::{parse_length, ACK, CHUNK_SIZE, FRAME_TERMINATOR, MAX_FRAME_SIZE, NOT_FOUND};

/// Outcome of receiving a sized transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// The sender announced [`NOT_FOUND`]; no body followed
    NotFound,

    /// The full body was received
    Complete(u64),
}

/// One duplex stream speaking the transfer protocol.
///
/// The channel owns the stream for its whole life. Reads go through an
/// internal buffer, so bytes that arrive right behind a control frame are
/// never lost to the next sized read.
#[derive(Debug)]
pub struct Channel<S> {
    stream: BufReader<S>,
    max_frame: usize,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Override the control frame size limit
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Write one control frame
    pub async fn send_frame(&mut self, message: &str) -> Result<(), ChannelError> {
        let bytes = message.as_bytes();
        if bytes.contains(&FRAME_TERMINATOR) {
            return Err(ChannelError::EmbeddedTerminator);
        }
        if bytes.len() > self.max_frame {
            return Err(ChannelError::FrameTooLarge {
                limit: self.max_frame,
            });
        }

        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.extend_from_slice(bytes);
        frame.push(FRAME_TERMINATOR);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        tracing::trace!(frame = %message, "sent control frame");
        Ok(())
    }

    /// Read one control frame
    pub async fn recv_frame(&mut self) -> Result<String, ChannelError> {
        let frame = self.read_frame().await?;
        let message = String::from_utf8(frame).map_err(|_| ChannelError::InvalidUtf8)?;
        tracing::trace!(frame = %message, "received control frame");
        Ok(message)
    }

    /// Read one control frame without decoding it
    async fn read_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        let limit = self.max_frame as u64 + 1;
        let mut frame = Vec::new();
        let read = (&mut self.stream)
            .take(limit)
            .read_until(FRAME_TERMINATOR, &mut frame)
            .await?;

        if read == 0 {
            return Err(ChannelError::Closed);
        }
        if frame.last() != Some(&FRAME_TERMINATOR) {
            if frame.len() as u64 >= limit {
                return Err(ChannelError::FrameTooLarge {
                    limit: self.max_frame,
                });
            }
            return Err(ChannelError::Closed);
        }
        frame.pop();
        Ok(frame)
    }

    /// Send `message` and wait for the peer's one-frame response
    pub async fn exchange(&mut self, message: &str) -> Result<String, ChannelError> {
        self.send_frame(message).await?;
        self.recv_frame().await
    }

    /// Wait for the peer's message, then answer it with `ack`
    pub async fn receive_then_acknowledge(&mut self, ack: &str) -> Result<String, ChannelError> {
        let message = self.recv_frame().await?;
        self.send_frame(ack).await?;
        Ok(message)
    }

    /// Like [`Channel::receive_then_acknowledge`], but hands back the frame's
    /// raw bytes so the caller decides what an undecodable frame means.
    pub async fn receive_raw_then_acknowledge(&mut self, ack: &str) -> Result<Vec<u8>, ChannelError> {
        let frame = self.read_frame().await?;
        self.send_frame(ack).await?;
        Ok(frame)
    }

    /// Announce `declared` bytes, stream them from `source`, and wait for the
    /// terminal acknowledgement.
    ///
    /// Never writes more than `declared` bytes. A source that runs dry early
    /// is a [`ChannelError::LengthMismatch`].
    pub async fn send_sized<R>(&mut self, declared: u64, source: R) -> Result<u64, ChannelError>
    where
        R: AsyncRead + Unpin,
    {
        self.exchange(&declared.to_string()).await?;

        let mut source = source.take(declared);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = source.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.stream.write_all(&chunk[..n]).await?;
            sent += n as u64;
        }
        self.stream.flush().await?;

        if sent != declared {
            return Err(ChannelError::LengthMismatch {
                declared,
                actual: sent,
            });
        }

        self.recv_frame().await?;
        tracing::debug!(bytes = sent, "sized transfer sent");
        Ok(sent)
    }

    /// Announce that the requested payload does not exist
    pub async fn send_not_found(&mut self) -> Result<(), ChannelError> {
        self.exchange(NOT_FOUND).await?;
        Ok(())
    }

    /// Receive a sized transfer into `sink`.
    ///
    /// Reads exactly the announced length. If the sink fails part way, the
    /// rest of the body is still consumed and acknowledged so the stream
    /// stays aligned, and the failure comes back as [`ChannelError::Sink`].
    pub async fn recv_sized<W>(&mut self, sink: &mut W) -> Result<Received, ChannelError>
    where
        W: AsyncWrite + Unpin,
    {
        let announcement = self.receive_then_acknowledge(ACK).await?;
        let Some(declared) = parse_length(&announcement)? else {
            return Ok(Received::NotFound);
        };

        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut remaining = declared;
        let mut sink_error = None;
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            let n = self.stream.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(ChannelError::Closed);
            }
            remaining -= n as u64;

            if sink_error.is_none() {
                if let Err(e) = sink.write_all(&chunk[..n]).await {
                    sink_error = Some(e);
                }
            }
        }
        if sink_error.is_none() {
            if let Err(e) = sink.flush().await {
                sink_error = Some(e);
            }
        }

        self.send_frame(ACK).await?;

        match sink_error {
            Some(source) => Err(ChannelError::Sink { declared, source }),
            None => {
                tracing::debug!(bytes = declared, "sized transfer received");
                Ok(Received::Complete(declared))
            }
        }
    }

    /// Receive a sized transfer into memory
    pub async fn recv_sized_bytes(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let mut body = Vec::new();
        match self.recv_sized(&mut body).await? {
            Received::NotFound => Ok(None),
            Received::Complete(_) => Ok(Some(body)),
        }
    }

    /// Receive and discard a sized transfer
    pub async fn drain_sized(&mut self) -> Result<Received, ChannelError> {
        let mut sink = tokio::io::sink();
        self.recv_sized(&mut sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (Channel<DuplexStream>, Channel<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        (Channel::new(a), Channel::new(b))
    }

    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other("disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_exchange_is_answered() {
        let (mut initiator, mut responder) = pair();

        let peer = tokio::spawn(async move {
            let got = responder.receive_then_acknowledge("ack").await.unwrap();
            assert_eq!(got, "download notes/a.txt");
        });

        let reply = initiator.exchange("download notes/a.txt").await.unwrap();
        assert_eq!(reply, "ack");
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_coalesced_frames_are_split() {
        let (raw, other) = duplex(1024);
        let mut channel = Channel::new(other);
        let mut raw = raw;
        raw.write_all(b"ack\0OK File removed\0").await.unwrap();

        assert_eq!(channel.recv_frame().await.unwrap(), "ack");
        assert_eq!(channel.recv_frame().await.unwrap(), "OK File removed");
    }

    #[tokio::test]
    async fn test_sized_transfer_round_trip() {
        let (mut sender, mut receiver) = pair();
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let peer = tokio::spawn(async move { receiver.recv_sized_bytes().await.unwrap() });

        let sent = sender
            .send_sized(payload.len() as u64, payload.as_slice())
            .await
            .unwrap();
        assert_eq!(sent, expected.len() as u64);
        assert_eq!(peer.await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_zero_length_transfer() {
        let (mut sender, mut receiver) = pair();
        let peer = tokio::spawn(async move { receiver.recv_sized_bytes().await.unwrap() });

        sender.send_sized(0, &b""[..]).await.unwrap();
        assert_eq!(peer.await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_not_found_short_circuits() {
        let (mut sender, mut receiver) = pair();
        let peer = tokio::spawn(async move {
            let received = receiver.drain_sized().await.unwrap();
            // The next frame must be the follow-up, not a leftover ack.
            let next = receiver.recv_frame().await.unwrap();
            (received, next)
        });

        sender.send_not_found().await.unwrap();
        sender.send_frame("ERR File not found").await.unwrap();

        let (received, next) = peer.await.unwrap();
        assert_eq!(received, Received::NotFound);
        assert_eq!(next, "ERR File not found");
    }

    #[tokio::test]
    async fn test_short_source_is_length_mismatch() {
        let (mut sender, mut receiver) = pair();
        let peer = tokio::spawn(async move {
            receiver.receive_then_acknowledge(ACK).await.unwrap();
            receiver
        });

        let result = sender.send_sized(10, &b"abc"[..]).await;
        assert!(matches!(
            result,
            Err(ChannelError::LengthMismatch {
                declared: 10,
                actual: 3
            })
        ));
        drop(peer.await.unwrap());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_stream_aligned() {
        let (mut sender, mut receiver) = pair();
        let peer = tokio::spawn(async move {
            let mut sink = BrokenSink;
            let result = receiver.recv_sized(&mut sink).await;
            assert!(matches!(result, Err(ChannelError::Sink { declared: 5, .. })));
            receiver.receive_then_acknowledge(ACK).await.unwrap()
        });

        sender.send_sized(5, &b"hello"[..]).await.unwrap();
        assert_eq!(sender.exchange("still in sync").await.unwrap(), "ack");
        assert_eq!(peer.await.unwrap(), "still in sync");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (raw, other) = duplex(1024);
        let mut channel = Channel::new(other).with_max_frame(8);
        let mut raw = raw;
        raw.write_all(b"0123456789\0").await.unwrap();

        assert!(matches!(
            channel.recv_frame().await,
            Err(ChannelError::FrameTooLarge { limit: 8 })
        ));
    }

    #[tokio::test]
    async fn test_outbound_frame_limits() {
        let (mut channel, _peer) = pair();
        let mut channel_small = Channel::new(duplex(64).0).with_max_frame(4);

        assert!(matches!(
            channel.send_frame("bad\0frame").await,
            Err(ChannelError::EmbeddedTerminator)
        ));
        assert!(matches!(
            channel_small.send_frame("too long").await,
            Err(ChannelError::FrameTooLarge { limit: 4 })
        ));
    }

    #[tokio::test]
    async fn test_closed_peer() {
        let (mut channel, peer) = pair();
        drop(peer);
        assert!(matches!(channel.recv_frame().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_peer_closing_mid_body() {
        let (raw, other) = duplex(1024);
        let mut receiver = Channel::new(other);
        let mut raw = raw;
        raw.write_all(b"100\0partial").await.unwrap();

        let body = tokio::spawn(async move { receiver.recv_sized_bytes().await });
        // Consume the "ack" for the announcement, then hang up.
        let mut ack = [0u8; 4];
        raw.read_exact(&mut ack).await.unwrap();
        drop(raw);

        assert!(matches!(body.await.unwrap(), Err(ChannelError::Closed)));
    }
}
