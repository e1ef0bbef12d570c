//! Parallel tree walking and chunked transfer engine
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────────────────────┐
//!        │        TreeEnumerator        │
//!        │  DynamicWorkQueue<Frontier>  │
//!        │  local dirs / remote pages   │
//!        └──────────────┬───────────────┘
//!                       │ ChunkPlan + chunk Jobs
//!                       ▼
//!        ┌──────────────────────────────┐
//!        │   BoundedHandoffQueue<Job>   │
//!        │   largest chunk first        │
//!        └──────────────┬───────────────┘
//!                       │
//!     ┌─────────────────┼─────────────────┐
//!     │                 │                 │
//! ┌───▼──────┐    ┌─────▼────┐      ┌─────▼────┐
//! │ Worker 1 │    │ Worker 2 │      │ Worker N │
//! │ chunk IO │    │ chunk IO │      │ chunk IO │
//! └───┬──────┘    └─────┬────┘      └─────┬────┘
//!     │   last chunk of a file finalizes  │
//!     └─────────────────┼─────────────────┘
//!                       ▼
//!                 TransferReport
//! ```
//!
//! The ACL walker in [`acl`] reuses the same dynamic queue but its workers
//! mutate entries directly instead of handing chunks to a second pool.

pub mod acl;
pub mod coordinator;
pub mod enumerator;
pub mod job;
pub mod plan;
pub mod queue;
pub mod stats;
pub mod worker;

pub use acl::{apply_acl_recursive, AclTreeWalker};
pub use coordinator::{download, upload, TransferCoordinator};
pub use job::{Direction, Job};
pub use plan::{ChunkPlan, ChunkSizing, FileStatus};
pub use queue::{BoundedHandoffQueue, DynamicWorkQueue, WorkGuard};
pub use stats::{AclReport, TransferReport, WorkerStats};
