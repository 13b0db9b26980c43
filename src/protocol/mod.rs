//! Command protocol
//!
//! Commands are single control frames of space-delimited text. The first
//! token selects the operation; the rest are positional arguments whose
//! count is fixed per operation:
//!
//! ```text
//! upload <name> <sizeBytes> <destRelPath>
//! download <relPath>
//! delete <name>
//! list <relPath>
//! archive <fileType>            # fileType ∈ {c, txt, pdf}
//! ```
//!
//! The verbs of the older wire format (`ufile`, `dfile`, `rmfile`,
//! `display`, `dtar`) are accepted on input. Encoding always produces the
//! names above.
//!
//! Each command is answered by one [`Reply`] frame once the operation's
//! transfer (if any) has completed.

pub mod command;
pub mod reply;

pub use command::{ArchiveKind, Command, Operation, MAX_FIELDS};
pub use reply::Reply;

use thiserror::Error;

/// Errors in command shape or arguments.
///
/// None of these affect stream framing; the session replies and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Blank command frame
    #[error("empty command")]
    Empty,

    /// Command frame is not UTF-8 text
    #[error("command is not valid UTF-8")]
    InvalidEncoding,

    /// First token is not a known operation
    #[error("invalid command: {0}")]
    UnknownCommand(String),

    /// Wrong number of arguments for the operation
    #[error("{operation} expects {expected} argument(s), got {found}")]
    Arity {
        operation: Operation,
        expected: usize,
        found: usize,
    },

    /// Size argument is not a non-negative integer
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// Archive type outside {c, txt, pdf}
    #[error("invalid archive type: {0} (expected c, txt or pdf)")]
    InvalidArchiveKind(String),

    /// Argument cannot be carried as one token
    #[error("invalid argument: {0:?}")]
    InvalidArgument(String),

    /// File name has no extension to route on
    #[error("cannot route {0}: missing file extension")]
    MissingExtension(String),

    /// Upload announcement disagrees with the command's size field
    #[error("upload declared {declared} bytes but announced {announced}")]
    SizeMismatch { declared: u64, announced: u64 },
}
