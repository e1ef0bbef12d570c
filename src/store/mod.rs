//! Remote store access
//!
//! The engine talks to the hierarchical object store exclusively through the
//! [`RemoteStore`] trait. Authentication, the wire protocol and transport
//! retries belong to implementations of this trait, not to the engine.
//!
//! # Implementations
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  dyn RemoteStore                      │
//! │  shared by every worker thread (Send + Sync)          │
//! └───────────────┬───────────────────────┬──────────────┘
//!                 │                       │
//!        ┌────────▼────────┐     ┌────────▼────────┐
//!        │   MemoryStore   │     │     FsStore     │
//!        │  tests, faults  │     │  directory-root │
//!        └─────────────────┘     └─────────────────┘
//! ```

pub mod acl;
pub mod fs;
pub mod memory;
pub mod types;

use crate::error::{StoreError, StoreResult};
use std::io::{Read, Write};

pub use acl::{parse_acl_spec, AclEntry, AclMode, AclScope, AclType, Permission};
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use types::{DirectoryEntry, EntryKind, ListPage};

/// Byte source returned by [`RemoteStore::open_read`]
pub type ByteSource = Box<dyn Read + Send>;

/// Byte sink returned by [`RemoteStore::open_write`]
///
/// Data written is not guaranteed to be visible until [`ObjectWriter::commit`]
/// returns successfully.
pub trait ObjectWriter: Write + Send {
    /// Flush and publish the object
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Capability set of a hierarchical object store
pub trait RemoteStore: Send + Sync {
    /// Look up a single entry
    fn get_entry(&self, path: &str) -> StoreResult<DirectoryEntry>;

    /// List up to `page_size` children of `path`, resuming after `continuation`
    fn list_children(
        &self,
        path: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage>;

    /// Create a directory and any missing parents
    fn create_directory(&self, path: &str) -> StoreResult<bool>;

    /// Open an object for reading starting at `offset`
    fn open_read(&self, path: &str, offset: u64) -> StoreResult<ByteSource>;

    /// Create an object for writing
    fn open_write(&self, path: &str, overwrite: bool) -> StoreResult<Box<dyn ObjectWriter>>;

    /// Concatenate `sources` in order into a new object at `target`; sources are consumed
    fn concatenate(&self, target: &str, sources: &[String]) -> StoreResult<bool>;

    /// Rename `src` to `dst`
    fn rename(&self, src: &str, dst: &str, overwrite: bool) -> StoreResult<bool>;

    /// Delete a file, or a directory and everything below it
    fn delete(&self, path: &str) -> StoreResult<bool>;

    /// Apply an ACL spec to a single entry
    fn apply_acl(&self, path: &str, spec: &[AclEntry], mode: AclMode) -> StoreResult<()>;

    /// Check whether `path` exists
    fn exists(&self, path: &str) -> StoreResult<bool> {
        match self.get_entry(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Ensure `path` is an absolute `/`-separated store path without `..` segments
pub(crate) fn validate_path(path: &str) -> StoreResult<()> {
    if !path.starts_with('/') {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "store paths must be absolute".into(),
        });
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "parent traversal is not allowed".into(),
        });
    }
    Ok(())
}
