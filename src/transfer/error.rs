//! Errors raised by the transfer channel

use std::io;
use thiserror::Error;

/// Failures of the transfer primitive.
///
/// Every variant except [`ChannelError::Sink`] leaves the stream in an
/// unknown framing state, so the session owning the channel must end.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The peer closed the stream before a complete message arrived
    #[error("peer closed the connection")]
    Closed,

    /// Read or write failure on the underlying stream
    #[error("channel I/O failure: {0}")]
    Io(#[from] io::Error),

    /// A control frame grew past the configured limit
    #[error("control frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// A control frame was not valid UTF-8
    #[error("control frame is not valid UTF-8")]
    InvalidUtf8,

    /// An outbound control message contained the frame terminator
    #[error("control message contains a NUL byte")]
    EmbeddedTerminator,

    /// The peer announced something that is not a length
    #[error("invalid length announcement: {0:?}")]
    BadLength(String),

    /// The payload source ended before the announced length was sent
    #[error("declared {declared} bytes but the source produced {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    /// The local sink rejected a write; the body was still fully drained
    #[error("sink failed while receiving {declared} bytes: {source}")]
    Sink {
        declared: u64,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    /// Whether the stream can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Sink { .. })
    }
}
