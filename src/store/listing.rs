//! Recursive directory listings

use std::fs;
use std::io;
use std::path::{Component, Path};

use serde::Serialize;

use super::error::StorageError;

/// One regular file found by a walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    /// File name
    pub name: String,

    /// Path relative to the walk's starting directory, with a leading `/`
    pub rel_path: String,
}

/// Flattened listing of every regular file below a directory.
///
/// Rendered as one `name - relPath` line per file. Directories are walked
/// in name order so the output is reproducible; symlinks, other special
/// entries and in-flight upload files are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: Vec<ListingEntry>,
}

impl Listing {
    /// Walk `start` recursively. A missing directory yields an empty listing.
    pub fn walk(start: &Path) -> Result<Self, StorageError> {
        let mut entries = Vec::new();
        match walk_dir(start, start, &mut entries) {
            Ok(()) => Ok(Self { entries }),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !start.exists() => {
                Ok(Self::default())
            }
            Err(source) => Err(StorageError::Walk {
                path: start.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse rendered listing text
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| line.split_once(" - "))
            .map(|(name, rel_path)| ListingEntry {
                name: name.to_string(),
                rel_path: rel_path.to_string(),
            })
            .collect();
        Self { entries }
    }

    /// Append another listing's entries after this one's
    pub fn append(&mut self, other: Listing) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `name - relPath` lines
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} - {}\n", e.name, e.rel_path))
            .collect()
    }
}

fn walk_dir(start: &Path, dir: &Path, entries: &mut Vec<ListingEntry>) -> io::Result<()> {
    let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|child| child.file_name());

    for child in children {
        let file_type = child.file_type()?;
        let path = child.path();

        if file_type.is_dir() {
            walk_dir(start, &path, entries)?;
        } else if file_type.is_file() {
            let name = child.file_name().to_string_lossy().into_owned();
            if is_partial(&name) {
                continue;
            }
            entries.push(ListingEntry {
                name,
                rel_path: relative_display(start, &path),
            });
        }
    }

    Ok(())
}

/// Suffix of files still being received
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

fn is_partial(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

fn relative_display(start: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(start).unwrap_or(path);
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}
