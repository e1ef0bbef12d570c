//! bulkstore - Parallel bulk operations against a hierarchical object store
//!
//! Moves large directory trees between a local filesystem and a remote store,
//! and propagates ACL changes across large remote trees. Designed to handle
//! millions of entries and very large files without holding the tree in
//! memory.
//!
//! # Features
//!
//! - **Chunked Transfers**: Large files are split into fixed-size ranges that
//!   move independently, then are concatenated (upload) or renamed (download)
//!   and verified by length.
//!
//! - **Concurrent Enumeration**: The tree is discovered while it is being
//!   transferred; termination is detected with an in-flight counter rather
//!   than by waiting for an empty queue.
//!
//! - **Memory Bounded**: The job queue has a fixed capacity and applies
//!   backpressure to the enumerator.
//!
//! - **Paginated ACL Walks**: Directories of any size are listed one page at a
//!   time using continuation tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐         ┌──────────────────────────┐
//! │  Local filesystem  │◄───────►│  Engine (walker::*)      │
//! └────────────────────┘         │  enumerators + workers   │
//!                                └────────────┬─────────────┘
//!                                             │ RemoteStore trait
//!                                             ▼
//!                                ┌──────────────────────────┐
//!                                │  FsStore / MemoryStore   │
//!                                └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Upload a directory into the store
//! bulkstore --store /srv/store upload ./dataset /ingest
//!
//! # Grant read access recursively
//! bulkstore --store /srv/store modifyacl /ingest/dataset "user:alice:r-x,default:user:alice:r-x"
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod store;
pub mod walker;

pub use config::{CliArgs, Command, EngineConfig, IfExists, Operation};
pub use error::{BulkError, Result};
pub use store::{FsStore, MemoryStore, RemoteStore};
pub use walker::{apply_acl_recursive, download, upload, AclReport, TransferReport};
