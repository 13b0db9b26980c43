//! Per-command status replies

use std::fmt;

const OK_PREFIX: &str = "OK";
const ERR_PREFIX: &str = "ERR";

/// Final status frame sent after every command.
///
/// Only the `OK`/`ERR` prefix carries meaning; the message is for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(String),
    Err(String),
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::Ok(message.into())
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Err(message.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Ok(m) | Self::Err(m) => m,
        }
    }

    /// Decode a reply frame. Anything without the `OK` prefix is a failure.
    pub fn parse(frame: &str) -> Self {
        if let Some(rest) = strip_tag(frame, OK_PREFIX) {
            return Self::Ok(rest.to_string());
        }
        match strip_tag(frame, ERR_PREFIX) {
            Some(rest) => Self::Err(rest.to_string()),
            None => Self::Err(frame.to_string()),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Encode, cutting the message short so the frame fits in `limit` bytes
    pub fn encode_within(&self, limit: usize) -> String {
        let mut frame = self.encode();
        if frame.len() > limit {
            let mut cut = limit;
            while !frame.is_char_boundary(cut) {
                cut -= 1;
            }
            frame.truncate(cut);
        }
        frame
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(m) => write!(f, "{OK_PREFIX} {m}"),
            Self::Err(m) => write!(f, "{ERR_PREFIX} {m}"),
        }
    }
}

fn strip_tag<'a>(frame: &'a str, tag: &str) -> Option<&'a str> {
    let rest = frame.strip_prefix(tag)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_encoding() {
        assert_eq!(Reply::ok("File removed").encode(), "OK File removed");
        assert_eq!(Reply::err("Failed to remove file").encode(), "ERR Failed to remove file");
    }

    #[test]
    fn test_reply_parsing() {
        assert_eq!(Reply::parse("OK File removed"), Reply::ok("File removed"));
        assert_eq!(Reply::parse("OK"), Reply::ok(""));
        assert_eq!(Reply::parse("ERR nope"), Reply::err("nope"));
    }

    #[test]
    fn test_encode_within_limit() {
        let reply = Reply::err("é".repeat(100));
        let frame = reply.encode_within(11);
        assert!(frame.len() <= 11);
        assert!(frame.starts_with("ERR "));
        assert_eq!(Reply::ok("short").encode_within(64), "OK short");
    }

    #[test]
    fn test_untagged_reply_is_failure() {
        let reply = Reply::parse("OKAY then");
        assert!(!reply.is_ok());
        assert_eq!(reply.message(), "OKAY then");
    }
}
