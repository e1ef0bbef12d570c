//! Recursive ACL propagation over a remote tree
//!
//! Every walker thread is both a consumer and a producer of one
//! [`DynamicWorkQueue`]. A directory contributes two tasks when it is
//! discovered: the mutation of its own ACL and the listing of its first page.
//! A listing task re-enqueues itself with the next continuation token until
//! the listing is exhausted, so an arbitrarily large directory never holds a
//! thread for longer than one page.
//!
//! Directories receive the full spec. Files only receive the access-scope
//! entries, since default entries are meaningless on a file.
//!
//! An entry that vanished between listing and mutation (404) is counted and
//! ignored. Any other store error aborts the run: the remaining threads drain
//! the queue without doing work and the first error is returned.

use super::queue::DynamicWorkQueue;
use super::stats::AclReport;
use crate::config::EngineConfig;
use crate::error::{Result, StoreError, StoreResult, WorkerError};
use crate::progress::{ProgressMonitor, ProgressSource};
use crate::store::types::normalize_path;
use crate::store::{AclEntry, AclMode, AclScope, RemoteStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Unit of work for the ACL walk
#[derive(Debug, Clone, PartialEq, Eq)]
enum AclTask {
    /// Apply the spec to a single entry
    Mutate { path: String, is_dir: bool },
    /// Fetch one page of a directory, resuming after `continuation`
    ListChildren {
        dir: String,
        continuation: Option<String>,
    },
}

struct AclShared {
    store: Arc<dyn RemoteStore>,
    queue: DynamicWorkQueue<AclTask>,
    mode: AclMode,
    dir_spec: Vec<AclEntry>,
    file_spec: Vec<AclEntry>,
    page_size: usize,

    files: AtomicU64,
    directories: AtomicU64,
    mutations: AtomicU64,
    not_found: AtomicU64,

    /// Tasks handled, sampled by the progress monitor
    processed: Arc<AtomicU64>,

    abort: AtomicBool,
    fatal: Mutex<Option<(usize, StoreError)>>,
}

/// Applies an ACL spec to a remote entry and everything below it
pub struct AclTreeWalker {
    store: Arc<dyn RemoteStore>,
    config: EngineConfig,
}

impl AclTreeWalker {
    pub fn new(store: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Walk `path` and apply `spec` with `mode` to every entry
    pub fn run(self, path: &str, spec: &[AclEntry], mode: AclMode) -> Result<AclReport> {
        self.config.validate()?;
        let started = Instant::now();
        let path = normalize_path(path.trim());

        // A missing root is fatal, unlike entries that vanish mid-walk
        let root = self.store.get_entry(&path)?;

        let shared = Arc::new(AclShared {
            store: Arc::clone(&self.store),
            queue: DynamicWorkQueue::new(),
            mode,
            dir_spec: spec.to_vec(),
            file_spec: file_subset(spec),
            page_size: self.config.acl_page_size,
            files: AtomicU64::new(0),
            directories: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            processed: Arc::new(AtomicU64::new(0)),
            abort: AtomicBool::new(false),
            fatal: Mutex::new(None),
        });

        if root.kind.is_dir() {
            discover_directory(&shared, root.full_path);
        } else {
            shared.files.fetch_add(1, Ordering::Relaxed);
            shared.queue.add(AclTask::Mutate {
                path: root.full_path,
                is_dir: false,
            });
        }

        info!(
            path = %path,
            mode = mode.as_str(),
            workers = self.config.worker_count,
            "Starting ACL walk"
        );

        let monitor = ProgressMonitor::start(
            ProgressSource::Count {
                done: Arc::clone(&shared.processed),
            },
            self.config.progress_interval,
            self.config.show_progress,
        )
        .map_err(|e| warn!(error = %e, "Progress display unavailable"))
        .ok();

        let handles = spawn_walkers(self.config.worker_count, &shared);
        let mut first_error = None;
        match handles {
            Ok(handles) => {
                for (id, handle) in handles {
                    if handle.join().is_err() {
                        // A panicking thread leaves its task registered; stop the rest
                        shared.abort.store(true, Ordering::SeqCst);
                        first_error.get_or_insert(WorkerError::Panicked {
                            id,
                            message: "ACL walker thread panicked".into(),
                        });
                    }
                }
            }
            Err(e) => first_error = Some(e),
        }

        if let Some(monitor) = monitor {
            monitor.cancel();
        }

        if let Some((id, source)) = shared.fatal.lock().take() {
            return Err(WorkerError::Store { id, source }.into());
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        let report = AclReport {
            files: shared.files.load(Ordering::Relaxed),
            directories: shared.directories.load(Ordering::Relaxed),
            mutations: shared.mutations.load(Ordering::Relaxed),
            not_found: shared.not_found.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };
        info!(
            files = report.files,
            directories = report.directories,
            mutations = report.mutations,
            not_found = report.not_found,
            duration_secs = report.elapsed.as_secs(),
            "ACL walk completed"
        );
        Ok(report)
    }
}

/// Apply `spec` recursively under `path`
pub fn apply_acl_recursive(
    store: Arc<dyn RemoteStore>,
    path: &str,
    spec: &[AclEntry],
    mode: AclMode,
    config: &EngineConfig,
) -> Result<AclReport> {
    AclTreeWalker::new(store, config.clone()).run(path, spec, mode)
}

/// Entries that apply to files
fn file_subset(spec: &[AclEntry]) -> Vec<AclEntry> {
    spec.iter()
        .filter(|e| e.scope == AclScope::Access)
        .cloned()
        .collect()
}

fn discover_directory(shared: &AclShared, dir: String) {
    shared.directories.fetch_add(1, Ordering::Relaxed);
    shared.queue.add(AclTask::Mutate {
        path: dir.clone(),
        is_dir: true,
    });
    shared.queue.add(AclTask::ListChildren {
        dir,
        continuation: None,
    });
}

fn spawn_walkers(
    count: usize,
    shared: &Arc<AclShared>,
) -> std::result::Result<Vec<(usize, JoinHandle<()>)>, WorkerError> {
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let thread_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("acl-{}", id))
            .spawn(move || walk_loop(id, &thread_shared));
        match spawned {
            Ok(handle) => handles.push((id, handle)),
            Err(e) => {
                // Threads already running finish the walk on their own
                for (_, handle) in handles {
                    let _ = handle.join();
                }
                return Err(WorkerError::InitFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(handles)
}

fn walk_loop(id: usize, shared: &AclShared) {
    debug!(worker = id, "ACL walker starting");

    while let Some((task, _guard)) = shared.queue.poll_guarded() {
        if shared.abort.load(Ordering::Relaxed) {
            continue;
        }
        let result = match task {
            AclTask::Mutate { path, is_dir } => mutate(shared, &path, is_dir),
            AclTask::ListChildren { dir, continuation } => list_page(shared, dir, continuation),
        };
        shared.processed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = result {
            error!(worker = id, path = %e.path(), error = %e, "Fatal error, aborting ACL walk");
            shared.abort.store(true, Ordering::SeqCst);
            shared.fatal.lock().get_or_insert((id, e));
        }
    }

    debug!(worker = id, "ACL walker finished");
}

fn mutate(shared: &AclShared, path: &str, is_dir: bool) -> StoreResult<()> {
    let spec = if is_dir {
        &shared.dir_spec
    } else {
        &shared.file_spec
    };
    if spec.is_empty() {
        return Ok(());
    }

    shared.mutations.fetch_add(1, Ordering::Relaxed);
    match shared.store.apply_acl(path, spec, shared.mode) {
        Ok(()) => {
            trace!(path = %path, "ACL applied");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(path = %path, "Entry vanished before ACL update");
            shared.not_found.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn list_page(shared: &AclShared, dir: String, continuation: Option<String>) -> StoreResult<()> {
    let page = match shared
        .store
        .list_children(&dir, shared.page_size, continuation.as_deref())
    {
        Ok(page) => page,
        Err(e) if e.is_not_found() => {
            debug!(path = %dir, "Directory vanished before listing");
            shared.not_found.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    trace!(path = %dir, entries = page.entries.len(), "Listed page");
    for child in page.entries {
        if child.kind.is_dir() {
            discover_directory(shared, child.full_path);
        } else {
            shared.files.fetch_add(1, Ordering::Relaxed);
            shared.queue.add(AclTask::Mutate {
                path: child.full_path,
                is_dir: false,
            });
        }
    }

    if let Some(token) = page.continuation {
        shared.queue.add(AclTask::ListChildren {
            dir,
            continuation: Some(token),
        });
    }
    Ok(())
}
