//! Transfer channel shared by every node role
//!
//! All traffic between a client and the coordinator, and between the
//! coordinator and its backend stores, runs over [`Channel`]. Two framing
//! tiers exist on one duplex stream:
//!
//! - **Control frames**: short UTF-8 messages terminated by a single NUL
//!   byte. They are always exchanged in strict alternation: the initiator
//!   calls [`Channel::exchange`], the responder calls
//!   [`Channel::receive_then_acknowledge`].
//! - **Sized transfers**: a bulk body whose length is announced in a control
//!   exchange first. The receiver reads exactly that many bytes and answers
//!   with a terminal [`ACK`].
//!
//! ```text
//! initiator                          responder
//!    | ---- "<len>"\0 --------------->  |
//!    | <--- "ack"\0 ------------------  |
//!    | ---- <len bytes of body> ----->  |
//!    | <--- "ack"\0 ------------------  |
//! ```
//!
//! A declared length of [`NOT_FOUND`] short-circuits the transfer: no body
//! and no terminal acknowledgement follow.

pub mod channel;
pub mod error;

pub use channel::{Channel, Received};
pub use error::ChannelError;

/// Generic acknowledgement literal.
pub const ACK: &str = "ack";

/// Length announcement meaning "the requested payload does not exist".
pub const NOT_FOUND: &str = "-1";

/// Byte terminating every control frame.
pub const FRAME_TERMINATOR: u8 = 0;

/// Default upper bound for one control frame, terminator excluded.
pub const MAX_FRAME_SIZE: usize = 1024;

/// Chunk size used when moving bulk bodies. Not visible on the wire.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Parse a length announcement.
///
/// Returns `Ok(None)` for [`NOT_FOUND`].
pub fn parse_length(announcement: &str) -> Result<Option<u64>, ChannelError> {
    let trimmed = announcement.trim();
    if trimmed == NOT_FOUND {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ChannelError::BadLength(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_length_values() {
        assert_eq!(parse_length("0").unwrap(), Some(0));
        assert_eq!(parse_length("4096").unwrap(), Some(4096));
        assert_eq!(parse_length(" 12 ").unwrap(), Some(12));
    }

    #[test]
    fn test_parse_length_not_found() {
        assert_eq!(parse_length("-1").unwrap(), None);
    }

    #[test]
    fn test_parse_length_rejects_garbage() {
        assert!(matches!(parse_length("-2"), Err(ChannelError::BadLength(_))));
        assert!(matches!(parse_length("ack"), Err(ChannelError::BadLength(_))));
        assert!(matches!(parse_length(""), Err(ChannelError::BadLength(_))));
    }
}
