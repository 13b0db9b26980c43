//! Command encoding and decoding

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Maximum number of whitespace-separated fields in a command
pub const MAX_FIELDS: usize = 5;

// ============================================================================
// Operation
// ============================================================================

/// The five operations a node understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
    Delete,
    List,
    Archive,
}

impl Operation {
    /// All operations
    pub fn all() -> &'static [Operation] {
        &[
            Self::Upload,
            Self::Download,
            Self::Delete,
            Self::List,
            Self::Archive,
        ]
    }

    /// Canonical wire verb
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Archive => "archive",
        }
    }

    /// Verb used by the older wire format
    pub fn legacy_verb(&self) -> &'static str {
        match self {
            Self::Upload => "ufile",
            Self::Download => "dfile",
            Self::Delete => "rmfile",
            Self::List => "display",
            Self::Archive => "dtar",
        }
    }

    /// Number of arguments after the verb
    pub fn arity(&self) -> usize {
        match self {
            Self::Upload => 3,
            Self::Download | Self::Delete | Self::List | Self::Archive => 1,
        }
    }

    /// Resolve a verb, canonical or legacy
    pub fn from_verb(verb: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|op| op.verb() == verb || op.legacy_verb() == verb)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

// ============================================================================
// Archive Kind
// ============================================================================

/// File type an archive is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    C,
    Txt,
    Pdf,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Txt => "txt",
            Self::Pdf => "pdf",
        }
    }

    /// File name of the archive, e.g. `txt.tar`
    pub fn archive_name(&self) -> String {
        format!("{}.tar", self.as_str())
    }
}

impl FromStr for ArchiveKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Self::C),
            "txt" => Ok(Self::Txt),
            "pdf" => Ok(Self::Pdf),
            other => Err(ProtocolError::InvalidArchiveKind(other.to_string())),
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Command
// ============================================================================

/// A decoded, arity-checked command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store `size` bytes as `name` under `dest`
    Upload { name: String, size: u64, dest: String },

    /// Stream the file at `path` back
    Download { path: String },

    /// Remove the file at `path`
    Delete { path: String },

    /// Recursive listing of the directory at `path`
    List { path: String },

    /// Archive of one file type's store
    Archive { kind: ArchiveKind },
}

impl Command {
    pub fn upload(
        name: impl Into<String>,
        size: u64,
        dest: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::Upload {
            name: token(name.into())?,
            size,
            dest: token(dest.into())?,
        })
    }

    pub fn download(path: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self::Download {
            path: token(path.into())?,
        })
    }

    pub fn delete(path: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self::Delete {
            path: token(path.into())?,
        })
    }

    pub fn list(path: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self::List {
            path: token(path.into())?,
        })
    }

    pub fn archive(kind: ArchiveKind) -> Self {
        Self::Archive { kind }
    }

    /// Decode a command frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let Some((verb, args)) = fields.split_first() else {
            return Err(ProtocolError::Empty);
        };

        let operation = Operation::from_verb(verb)
            .ok_or_else(|| ProtocolError::UnknownCommand((*verb).to_string()))?;

        if fields.len() > MAX_FIELDS || args.len() != operation.arity() {
            return Err(ProtocolError::Arity {
                operation,
                expected: operation.arity(),
                found: args.len(),
            });
        }

        let command = match operation {
            Operation::Upload => Self::Upload {
                name: args[0].to_string(),
                size: args[1]
                    .parse()
                    .map_err(|_| ProtocolError::InvalidSize(args[1].to_string()))?,
                dest: args[2].to_string(),
            },
            Operation::Download => Self::Download {
                path: args[0].to_string(),
            },
            Operation::Delete => Self::Delete {
                path: args[0].to_string(),
            },
            Operation::List => Self::List {
                path: args[0].to_string(),
            },
            Operation::Archive => Self::Archive {
                kind: args[0].parse()?,
            },
        };

        Ok(command)
    }

    /// Encode as a command frame
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Upload { .. } => Operation::Upload,
            Self::Download { .. } => Operation::Download,
            Self::Delete { .. } => Operation::Delete,
            Self::List { .. } => Operation::List,
            Self::Archive { .. } => Operation::Archive,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload { name, size, dest } => write!(f, "upload {name} {size} {dest}"),
            Self::Download { path } => write!(f, "download {path}"),
            Self::Delete { path } => write!(f, "delete {path}"),
            Self::List { path } => write!(f, "list {path}"),
            Self::Archive { kind } => write!(f, "archive {kind}"),
        }
    }
}

/// Accept a value only if it survives whitespace tokenization unchanged
fn token(value: String) -> Result<String, ProtocolError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\0') {
        return Err(ProtocolError::InvalidArgument(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        let cmd = Command::parse("upload report.pdf 4096 notes").unwrap();
        assert_eq!(
            cmd,
            Command::Upload {
                name: "report.pdf".to_string(),
                size: 4096,
                dest: "notes".to_string(),
            }
        );
        assert_eq!(cmd.operation(), Operation::Upload);
    }

    #[test]
    fn test_parse_single_argument_commands() {
        assert_eq!(
            Command::parse("download notes/a.txt").unwrap(),
            Command::Download {
                path: "notes/a.txt".to_string()
            }
        );
        assert_eq!(
            Command::parse("delete a.c").unwrap(),
            Command::Delete {
                path: "a.c".to_string()
            }
        );
        assert_eq!(
            Command::parse("list /").unwrap(),
            Command::List {
                path: "/".to_string()
            }
        );
        assert_eq!(
            Command::parse("archive pdf").unwrap(),
            Command::Archive {
                kind: ArchiveKind::Pdf
            }
        );
    }

    #[test]
    fn test_parse_legacy_verbs() {
        assert_eq!(
            Command::parse("ufile a.c 3 src").unwrap().operation(),
            Operation::Upload
        );
        assert_eq!(Command::parse("dfile a.c").unwrap().operation(), Operation::Download);
        assert_eq!(Command::parse("rmfile a.c").unwrap().operation(), Operation::Delete);
        assert_eq!(Command::parse("display x").unwrap().operation(), Operation::List);
        assert_eq!(Command::parse("dtar c").unwrap().operation(), Operation::Archive);
    }

    #[test]
    fn test_encode_uses_canonical_verbs() {
        let cmd = Command::parse("dfile notes/a.txt").unwrap();
        assert_eq!(cmd.encode(), "download notes/a.txt");
        assert_eq!(Command::archive(ArchiveKind::Txt).encode(), "archive txt");
    }

    #[test]
    fn test_tolerates_extra_whitespace() {
        let cmd = Command::parse("  delete   a.c  ").unwrap();
        assert_eq!(
            cmd,
            Command::Delete {
                path: "a.c".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_malformed_commands() {
        assert_eq!(Command::parse(""), Err(ProtocolError::Empty));
        assert_eq!(Command::parse("   "), Err(ProtocolError::Empty));
        assert_eq!(
            Command::parse("rename a b"),
            Err(ProtocolError::UnknownCommand("rename".to_string()))
        );
        assert!(matches!(
            Command::parse("upload a.c 10"),
            Err(ProtocolError::Arity {
                operation: Operation::Upload,
                expected: 3,
                found: 2
            })
        ));
        assert!(matches!(
            Command::parse("download"),
            Err(ProtocolError::Arity { found: 0, .. })
        ));
        assert!(matches!(
            Command::parse("list a b"),
            Err(ProtocolError::Arity { found: 2, .. })
        ));
        assert_eq!(
            Command::parse("upload a.c ten dir"),
            Err(ProtocolError::InvalidSize("ten".to_string()))
        );
        assert_eq!(
            Command::parse("upload a.c -1 dir"),
            Err(ProtocolError::InvalidSize("-1".to_string()))
        );
        assert_eq!(
            Command::parse("archive zip"),
            Err(ProtocolError::InvalidArchiveKind("zip".to_string()))
        );
    }

    #[test]
    fn test_constructors_reject_untokenizable_arguments() {
        assert!(Command::upload("my file.c", 1, "dir").is_err());
        assert!(Command::download("").is_err());
        assert!(Command::list("a\tb").is_err());
        assert!(Command::delete("ok.c").is_ok());
    }

    #[test]
    fn test_archive_names() {
        assert_eq!(ArchiveKind::C.archive_name(), "c.tar");
        assert_eq!("txt".parse::<ArchiveKind>().unwrap(), ArchiveKind::Txt);
    }
}
