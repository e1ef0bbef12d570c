//! Run statistics
//!
//! Each transfer worker owns a private [`WorkerStats`] that nothing else
//! writes while the run is active. The only shared piece is the live byte
//! counter, which the progress monitor samples. After the pool joins, the
//! driver folds every worker's stats into one [`TransferReport`].

use super::plan::FileStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Statistics collected by one transfer worker
#[derive(Debug)]
pub struct WorkerStats {
    /// Bytes moved by successful chunks; shared with the progress monitor
    bytes: Arc<AtomicU64>,

    /// Chunks transferred completely
    pub chunks_succeeded: u64,

    /// Chunks that failed or moved fewer bytes than planned
    pub chunks_failed: u64,

    /// Source paths of files and directories completed successfully
    pub successful: Vec<String>,

    /// Source paths that failed
    pub failed: Vec<String>,

    /// Source paths skipped because the destination existed
    pub skipped: Vec<String>,

    started: Option<Instant>,

    /// Wall time between `begin` and `end`
    pub elapsed: Duration,
}

impl WorkerStats {
    pub fn new(bytes: Arc<AtomicU64>) -> Self {
        Self {
            bytes,
            chunks_succeeded: 0,
            chunks_failed: 0,
            successful: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            started: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn end(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed = started.elapsed();
        }
    }

    /// Record the outcome of one chunk
    pub fn record_chunk(&mut self, status: FileStatus, size: u64) {
        match status {
            FileStatus::Success => {
                self.chunks_succeeded += 1;
                self.bytes.fetch_add(size, Ordering::Relaxed);
            }
            FileStatus::Failed => self.chunks_failed += 1,
            FileStatus::Skipped | FileStatus::Pending => {}
        }
    }

    /// Record the final outcome of a file or directory
    pub fn record_item(&mut self, path: String, status: FileStatus) {
        match status {
            FileStatus::Success => self.successful.push(path),
            FileStatus::Skipped => self.skipped.push(path),
            FileStatus::Failed | FileStatus::Pending => self.failed.push(path),
        }
    }

    /// Bytes moved so far
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Merged result of an upload or download run
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub chunks_succeeded: u64,
    pub chunks_failed: u64,
    pub bytes_transferred: u64,

    /// Total length of all enumerated files
    pub bytes_planned: u64,

    /// Longest worker elapsed time
    pub elapsed: Duration,
}

impl TransferReport {
    /// Report for a run that failed before any worker started
    pub fn failed_before_start(source: impl Into<String>) -> Self {
        Self {
            failed: vec![source.into()],
            ..Default::default()
        }
    }

    /// Fold one worker's stats into the report
    pub fn merge(&mut self, stats: WorkerStats) {
        self.bytes_transferred += stats.bytes_transferred();
        self.chunks_succeeded += stats.chunks_succeeded;
        self.chunks_failed += stats.chunks_failed;
        self.successful.extend(stats.successful);
        self.failed.extend(stats.failed);
        self.skipped.extend(stats.skipped);
        self.elapsed = self.elapsed.max(stats.elapsed);
    }

    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of items with a final outcome
    pub fn total_items(&self) -> usize {
        self.successful.len() + self.failed.len() + self.skipped.len()
    }
}

/// Result of a recursive ACL run
#[derive(Debug, Clone, Default)]
pub struct AclReport {
    /// Files reached by the walk
    pub files: u64,

    /// Directories reached by the walk (root included)
    pub directories: u64,

    /// ACL calls actually issued
    pub mutations: u64,

    /// Entries that vanished between listing and mutation
    pub not_found: u64,

    pub elapsed: Duration,
}

impl AclReport {
    /// Entries reached by the walk
    pub fn total_entries(&self) -> u64 {
        self.files + self.directories
    }
}
