//! Store engine
//!
//! File storage scoped to one namespace root. Every node role runs the same
//! [`StoreEngine`]; only what the router sends to it differs.
//!
//! - [`engine`] - put/get/remove/list/archive against a namespace root
//! - [`listing`] - recursive directory listings
//! - [`archive`] - the archiver seam and its tar.gz implementation
//! - [`staging`] - scratch files for bytes passing through a node

pub mod archive;
pub mod engine;
pub mod error;
pub mod listing;
pub mod staging;

pub use archive::{Archiver, TarGzArchiver};
pub use engine::StoreEngine;
pub use error::{ArchiveError, StorageError};
pub use listing::{Listing, ListingEntry};
pub use staging::{StagedFile, StagingArea};
