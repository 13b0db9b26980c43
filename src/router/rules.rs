//! Routing rules
//!
//! A routing rule decides, per file, which namespace owns it. The
//! coordinator shards by extension; backend stores own everything they are
//! sent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::{ArchiveKind, ProtocolError};

// ============================================================================
// Targets
// ============================================================================

/// A type-specific backend store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Holds `.txt` files
    Text,
    /// Holds `.pdf` files
    Pdf,
}

impl Backend {
    pub fn all() -> [Backend; 2] {
        [Self::Text, Self::Pdf]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Pdf => "pdf",
        }
    }

    /// File extension this backend owns
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Pdf => "pdf",
        }
    }

    pub fn archive_kind(&self) -> ArchiveKind {
        match self {
            Self::Text => ArchiveKind::Txt,
            Self::Pdf => ArchiveKind::Pdf,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an operation executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// This node's own store engine
    Local,
    /// Forwarded to a backend store
    Backend(Backend),
}

// ============================================================================
// Rules
// ============================================================================

/// Role-specific routing strategy
pub trait RoutingRule: Send + Sync + fmt::Debug {
    /// Target for an extension, given with or without its leading dot.
    /// An empty extension is an error, never a default route.
    fn route_extension(&self, extension: &str) -> Result<Target, ProtocolError>;

    /// Target for an archive request
    fn route_archive(&self, kind: ArchiveKind) -> Target;

    /// Backends whose listings follow the local one, in order
    fn fan_out(&self) -> &[Backend];

    /// Target for a file name or relative path
    fn route_name(&self, name: &str) -> Result<Target, ProtocolError> {
        match extension_of(name) {
            Some(extension) => self.route_extension(extension),
            None => Err(ProtocolError::MissingExtension(name.to_string())),
        }
    }
}

/// Extension of the final path component, without the dot
pub fn extension_of(name: &str) -> Option<&str> {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let (_, extension) = file_name.rsplit_once('.')?;
    (!extension.is_empty()).then_some(extension)
}

fn normalize(extension: &str) -> Result<&str, ProtocolError> {
    let bare = extension.strip_prefix('.').unwrap_or(extension);
    if bare.is_empty() {
        return Err(ProtocolError::MissingExtension(extension.to_string()));
    }
    Ok(bare)
}

/// Coordinator rule: `.txt` to the text store, `.pdf` to the pdf store,
/// every other extension stays local.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByExtension;

const COORDINATOR_FAN_OUT: &[Backend] = &[Backend::Pdf, Backend::Text];

impl RoutingRule for ByExtension {
    fn route_extension(&self, extension: &str) -> Result<Target, ProtocolError> {
        let target = match normalize(extension)? {
            "txt" => Target::Backend(Backend::Text),
            "pdf" => Target::Backend(Backend::Pdf),
            _ => Target::Local,
        };
        Ok(target)
    }

    fn route_archive(&self, kind: ArchiveKind) -> Target {
        Backend::all()
            .into_iter()
            .find(|backend| backend.archive_kind() == kind)
            .map_or(Target::Local, Target::Backend)
    }

    fn fan_out(&self) -> &[Backend] {
        COORDINATOR_FAN_OUT
    }
}

/// Backend rule: everything is served locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

impl RoutingRule for LocalOnly {
    fn route_extension(&self, extension: &str) -> Result<Target, ProtocolError> {
        normalize(extension)?;
        Ok(Target::Local)
    }

    fn route_archive(&self, _kind: ArchiveKind) -> Target {
        Target::Local
    }

    fn fan_out(&self) -> &[Backend] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_routes_by_extension() {
        let rule = ByExtension;
        assert_eq!(rule.route_extension(".txt").unwrap(), Target::Backend(Backend::Text));
        assert_eq!(rule.route_extension(".pdf").unwrap(), Target::Backend(Backend::Pdf));
        assert_eq!(rule.route_extension(".c").unwrap(), Target::Local);
        assert_eq!(rule.route_extension("h").unwrap(), Target::Local);
    }

    #[test]
    fn test_missing_extension_is_an_error() {
        let rule = ByExtension;
        assert!(matches!(
            rule.route_extension(""),
            Err(ProtocolError::MissingExtension(_))
        ));
        assert!(matches!(
            rule.route_extension("."),
            Err(ProtocolError::MissingExtension(_))
        ));
        assert!(matches!(
            rule.route_name("Makefile"),
            Err(ProtocolError::MissingExtension(_))
        ));
        assert!(matches!(
            LocalOnly.route_name("notes/README"),
            Err(ProtocolError::MissingExtension(_))
        ));
    }

    #[test]
    fn test_routing_is_deterministic() {
        let rule = ByExtension;
        for _ in 0..3 {
            assert_eq!(
                rule.route_name("a/b/report.pdf").unwrap(),
                Target::Backend(Backend::Pdf)
            );
        }
    }

    #[test]
    fn test_extension_comes_from_last_component() {
        assert_eq!(extension_of("notes.v2/readme"), None);
        assert_eq!(extension_of("notes.v2/readme.txt"), Some("txt"));
        assert_eq!(extension_of("archive.tar.pdf"), Some("pdf"));
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_archive_routing() {
        assert_eq!(ByExtension.route_archive(ArchiveKind::C), Target::Local);
        assert_eq!(
            ByExtension.route_archive(ArchiveKind::Txt),
            Target::Backend(Backend::Text)
        );
        assert_eq!(LocalOnly.route_archive(ArchiveKind::Pdf), Target::Local);
    }

    #[test]
    fn test_fan_out_order() {
        assert_eq!(ByExtension.fan_out(), &[Backend::Pdf, Backend::Text]);
        assert!(LocalOnly.fan_out().is_empty());
    }
}
