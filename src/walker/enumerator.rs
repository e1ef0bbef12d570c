//! Tree enumeration
//!
//! Enumerator threads expand the source tree through a [`DynamicWorkQueue`]
//! of frontier items and emit transfer jobs into the shared
//! [`BoundedHandoffQueue`]:
//!
//! ```text
//!   frontier ──► directory ──► children back into frontier
//!      │                       (no children: one Mkdir job)
//!      └──────► file ───────► ChunkPlan + one job per chunk ──► job queue
//! ```
//!
//! Once every enumerator thread has drained the frontier, [`TreeEnumerator::join`]
//! marks the job queue done so transfer workers can exit.

use super::job::{DirTarget, Direction, Job};
use super::plan::{ChunkPlan, ChunkSizing};
use super::queue::{BoundedHandoffQueue, DynamicWorkQueue};
use crate::error::WorkerError;
use crate::store::types::{join_path, DirectoryEntry};
use crate::store::RemoteStore;
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// An item awaiting expansion
#[derive(Debug, Clone)]
pub enum Frontier {
    /// Local file or directory to upload into remote directory `dest_dir`
    Local { path: PathBuf, dest_dir: String },
    /// Remote file or directory to download into local directory `dest_dir`
    Remote {
        entry: DirectoryEntry,
        dest_dir: PathBuf,
    },
}

impl Frontier {
    fn display(&self) -> String {
        match self {
            Frontier::Local { path, .. } => path.display().to_string(),
            Frontier::Remote { entry, .. } => entry.full_path.clone(),
        }
    }
}

/// What the enumerators found
#[derive(Debug, Clone, Default)]
pub struct EnumerationSummary {
    pub files: u64,
    pub directories: u64,

    /// Directories that could not be listed
    pub failed: Vec<String>,
}

/// State shared by all enumerator threads
struct EnumeratorShared {
    store: Arc<dyn RemoteStore>,
    frontier: DynamicWorkQueue<Frontier>,
    jobs: Arc<BoundedHandoffQueue<Job>>,
    sizing: ChunkSizing,
    page_size: usize,
    bytes_planned: Arc<AtomicU64>,
    files: AtomicU64,
    directories: AtomicU64,
    failed: Mutex<Vec<String>>,
}

/// Settings for a [`TreeEnumerator`]
pub struct EnumeratorOptions {
    pub threads: usize,
    pub sizing: ChunkSizing,
    /// Listing page size for remote directories
    pub page_size: usize,
}

/// Running set of enumerator threads
pub struct TreeEnumerator {
    shared: Arc<EnumeratorShared>,
    handles: Vec<(usize, JoinHandle<()>)>,
}

impl TreeEnumerator {
    /// Seed the frontier with `root` and start enumerating
    ///
    /// `bytes_planned` is incremented by the length of every file found.
    pub fn start(
        root: Frontier,
        store: Arc<dyn RemoteStore>,
        jobs: Arc<BoundedHandoffQueue<Job>>,
        bytes_planned: Arc<AtomicU64>,
        options: EnumeratorOptions,
    ) -> Result<Self, WorkerError> {
        let shared = Arc::new(EnumeratorShared {
            store,
            frontier: DynamicWorkQueue::new(),
            jobs,
            sizing: options.sizing,
            page_size: options.page_size,
            bytes_planned,
            files: AtomicU64::new(0),
            directories: AtomicU64::new(0),
            failed: Mutex::new(Vec::new()),
        });
        shared.frontier.add(root);

        let mut enumerator = Self {
            shared,
            handles: Vec::with_capacity(options.threads),
        };

        for id in 0..options.threads {
            let shared = Arc::clone(&enumerator.shared);
            let spawned = thread::Builder::new()
                .name(format!("enumerator-{}", id))
                .spawn(move || enumerate_loop(id, &shared));

            match spawned {
                Ok(handle) => enumerator.handles.push((id, handle)),
                Err(e) => {
                    let err = WorkerError::InitFailed {
                        id,
                        reason: e.to_string(),
                    };
                    // Threads already running finish the walk on their own
                    let _ = enumerator.join();
                    return Err(err);
                }
            }
        }

        Ok(enumerator)
    }

    /// Wait for the walk to finish and close the job queue
    pub fn join(self) -> Result<EnumerationSummary, WorkerError> {
        let mut first_error = None;
        for (id, handle) in self.handles {
            if handle.join().is_err() && first_error.is_none() {
                first_error = Some(WorkerError::Panicked {
                    id,
                    message: "Enumerator thread panicked".into(),
                });
            }
        }
        self.shared.jobs.mark_done();

        if let Some(err) = first_error {
            return Err(err);
        }

        let summary = EnumerationSummary {
            files: self.shared.files.load(Ordering::Relaxed),
            directories: self.shared.directories.load(Ordering::Relaxed),
            failed: std::mem::take(&mut *self.shared.failed.lock()),
        };
        info!(
            files = summary.files,
            directories = summary.directories,
            failed = summary.failed.len(),
            "Enumeration complete"
        );
        Ok(summary)
    }
}

fn enumerate_loop(id: usize, shared: &EnumeratorShared) {
    debug!(enumerator = id, "Enumerator starting");

    while let Some((item, _guard)) = shared.frontier.poll_guarded() {
        match item {
            Frontier::Local { path, dest_dir } => expand_local(shared, path, dest_dir),
            Frontier::Remote { entry, dest_dir } => expand_remote(shared, entry, dest_dir),
        }
    }

    debug!(enumerator = id, "Enumerator finished");
}

fn record_failure(shared: &EnumeratorShared, item: String) {
    shared.failed.lock().push(item);
}

fn emit_file(shared: &EnumeratorShared, plan: ChunkPlan, direction: Direction) {
    let plan = Arc::new(plan);
    shared.files.fetch_add(1, Ordering::Relaxed);
    shared.bytes_planned.fetch_add(plan.length(), Ordering::Relaxed);

    let jobs = Job::chunks_of(&plan, shared.sizing.layout(plan.length()), direction);
    trace!(
        path = %plan.source_display(),
        length = plan.length(),
        chunks = jobs.len(),
        "Planned file"
    );
    for job in jobs {
        shared.jobs.put(job);
    }
}

fn expand_local(shared: &EnumeratorShared, path: PathBuf, dest_dir: String) {
    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot stat local entry");
            record_failure(shared, path.display().to_string());
            return;
        }
    };

    if meta.is_file() {
        let plan = ChunkPlan::for_upload(path, meta.len(), &dest_dir, &shared.sizing);
        emit_file(shared, plan, Direction::Upload);
        return;
    }
    if !meta.is_dir() {
        debug!(path = %path.display(), "Skipping special file");
        return;
    }

    shared.directories.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let remote_dir = join_path(&dest_dir, &name);

    let entries = match fs::read_dir(&path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot list local directory");
            record_failure(shared, path.display().to_string());
            return;
        }
    };

    let mut children = 0usize;
    for entry in entries {
        match entry {
            Ok(entry) => {
                children += 1;
                shared.frontier.add(Frontier::Local {
                    path: entry.path(),
                    dest_dir: remote_dir.clone(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading directory entry");
                record_failure(shared, path.display().to_string());
            }
        }
    }

    if children == 0 {
        shared.jobs.put(Job::Mkdir(DirTarget::Remote(remote_dir)));
    }
}

fn expand_remote(shared: &EnumeratorShared, entry: DirectoryEntry, dest_dir: PathBuf) {
    if entry.kind.is_file() {
        let source = entry.full_path.clone();
        match ChunkPlan::for_download(entry, &dest_dir, &shared.sizing) {
            Ok(plan) => emit_file(shared, plan, Direction::Download),
            Err(e) => {
                warn!(path = %source, dest = %dest_dir.display(), error = %e, "Cannot prepare local destination");
                record_failure(shared, source);
            }
        }
        return;
    }

    shared.directories.fetch_add(1, Ordering::Relaxed);
    let local_dir = if entry.name.is_empty() {
        dest_dir
    } else {
        dest_dir.join(&entry.name)
    };

    let mut cursor: Option<String> = None;
    let mut children = 0usize;
    loop {
        let page = match shared
            .store
            .list_children(&entry.full_path, shared.page_size, cursor.as_deref())
        {
            Ok(page) => page,
            Err(e) => {
                warn!(path = %entry.full_path, error = %e, "Cannot list remote directory");
                record_failure(shared, entry.full_path.clone());
                return;
            }
        };

        let page_len = page.entries.len();
        children += page_len;
        for child in page.entries {
            cursor = Some(child.name.clone());
            shared.frontier.add(Frontier::Remote {
                entry: child,
                dest_dir: local_dir.clone(),
            });
        }
        if page_len < shared.page_size {
            break;
        }
    }

    if children == 0 {
        shared.jobs.put(Job::Mkdir(DirTarget::Local(local_dir)));
    }
}
