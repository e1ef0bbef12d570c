//! Transfer coordinator - drives one upload or download run
//!
//! The coordinator is responsible for:
//! - Validating the source and destination before any thread starts
//! - Setting up the job queue, the worker pool and the enumerators
//! - Progress reporting
//! - Joining everything and merging per-worker statistics

use crate::config::EngineConfig;
use crate::error::{BulkError, Result, WorkerError};
use crate::progress::{ProgressMonitor, ProgressSource};
use crate::store::types::normalize_path;
use crate::store::RemoteStore;
use crate::walker::enumerator::{EnumeratorOptions, Frontier, TreeEnumerator};
use crate::walker::job::{Direction, Job};
use crate::walker::queue::BoundedHandoffQueue;
use crate::walker::stats::TransferReport;
use crate::walker::worker::{spawn_workers, TransferContext, TransferWorker};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upload the local file or directory `source` into remote directory `destination`
///
/// `source` lands at `destination/<name of source>`.
pub fn upload(
    store: Arc<dyn RemoteStore>,
    source: &Path,
    destination: &str,
    config: &EngineConfig,
) -> Result<TransferReport> {
    if source.as_os_str().is_empty() {
        return Err(invalid("source", "must not be empty"));
    }
    let destination = destination.trim();
    if destination.is_empty() {
        return Err(invalid("destination", "must not be empty"));
    }

    let source = source.canonicalize().map_err(|e| BulkError::InvalidArgument {
        name: "source",
        reason: format!("'{}': {}", source.display(), e),
    })?;
    let destination = normalize_path(destination);

    if source.is_file() {
        match store.get_entry(&destination) {
            Ok(entry) if entry.kind.is_file() => {
                return Err(invalid(
                    "destination",
                    format!("'{}' is an existing file", destination),
                ));
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }

    let root = Frontier::Local {
        path: source,
        dest_dir: destination,
    };
    TransferCoordinator::new(store, config.clone()).run(root, Direction::Upload)
}

/// Download the remote file or directory `source` into local directory `destination`
///
/// If `source` cannot be looked up, the returned report lists it as failed
/// and no threads are started.
pub fn download(
    store: Arc<dyn RemoteStore>,
    source: &str,
    destination: &Path,
    config: &EngineConfig,
) -> Result<TransferReport> {
    let source = source.trim();
    if source.is_empty() {
        return Err(invalid("source", "must not be empty"));
    }
    if destination.as_os_str().is_empty() {
        return Err(invalid("destination", "must not be empty"));
    }

    let source = normalize_path(source);
    let entry = match store.get_entry(&source) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(path = %source, error = %e, "Cannot look up download source");
            return Ok(TransferReport::failed_before_start(source));
        }
    };

    let root = Frontier::Remote {
        entry,
        dest_dir: destination.to_path_buf(),
    };
    TransferCoordinator::new(store, config.clone()).run(root, Direction::Download)
}

fn invalid(name: &'static str, reason: impl Into<String>) -> BulkError {
    BulkError::InvalidArgument {
        name,
        reason: reason.into(),
    }
}

/// Owns the queue and threads of a single transfer run
pub struct TransferCoordinator {
    store: Arc<dyn RemoteStore>,
    config: EngineConfig,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Enumerate `root` and transfer everything under it
    pub fn run(self, root: Frontier, direction: Direction) -> Result<TransferReport> {
        self.config.validate()?;

        let start_time = Instant::now();
        let start_datetime: DateTime<Utc> = Utc::now();
        info!(
            direction = ?direction,
            workers = self.config.worker_count,
            chunk_size = self.config.chunk_size,
            "Starting transfer"
        );
        debug!(start_time = %start_datetime.to_rfc3339(), "Transfer started");

        let jobs: Arc<BoundedHandoffQueue<Job>> = Arc::new(BoundedHandoffQueue::new(
            self.config.queue_capacity,
            self.config.largest_first,
        ));
        let ctx = Arc::new(TransferContext {
            store: Arc::clone(&self.store),
            jobs: Arc::clone(&jobs),
            overwrite: self.config.overwrites(),
            buffer_size: self.config.buffer_size,
        });

        let workers = match spawn_workers(self.config.worker_count, &ctx) {
            Ok(workers) => workers,
            Err(e) => {
                // Release any worker that did start
                jobs.mark_done();
                return Err(e.into());
            }
        };

        let bytes_planned = Arc::new(AtomicU64::new(0));
        let enumerator = TreeEnumerator::start(
            root,
            Arc::clone(&self.store),
            Arc::clone(&jobs),
            Arc::clone(&bytes_planned),
            EnumeratorOptions {
                threads: self.config.enumerator_count,
                sizing: self.config.sizing(),
                page_size: self.config.download_page_size,
            },
        );
        let enumerator = match enumerator {
            Ok(enumerator) => enumerator,
            Err(e) => {
                // The failed start already closed the queue
                let _ = join_workers(workers);
                return Err(e.into());
            }
        };

        let monitor = ProgressMonitor::start(
            ProgressSource::Bytes {
                planned: Arc::clone(&bytes_planned),
                counters: workers.iter().map(TransferWorker::bytes_counter).collect(),
            },
            self.config.progress_interval,
            self.config.show_progress,
        );
        let monitor = match monitor {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!(error = %e, "Progress display unavailable");
                None
            }
        };

        // Closes the job queue once the tree is exhausted
        let enumerated = enumerator.join();
        let joined = join_workers(workers);

        if let Some(monitor) = monitor {
            monitor.cancel();
        }

        let summary = enumerated?;
        let mut report = joined?;
        report.failed.extend(summary.failed);
        report.bytes_planned = bytes_planned.load(Ordering::Relaxed);

        info!(
            files = summary.files,
            directories = summary.directories,
            succeeded = report.successful.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            bytes = report.bytes_transferred,
            duration_secs = start_time.elapsed().as_secs(),
            "Transfer completed"
        );

        Ok(report)
    }
}

/// Join all workers and fold their statistics into one report
fn join_workers(workers: Vec<TransferWorker>) -> std::result::Result<TransferReport, WorkerError> {
    let mut report = TransferReport::default();
    let mut first_error = None;

    for worker in workers {
        let id = worker.id();
        match worker.join() {
            Ok(stats) => report.merge(stats),
            Err(e) => {
                warn!(worker = id, error = %e, "Worker failed to join cleanly");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}
