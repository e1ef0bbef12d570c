//! Transfer worker threads
//!
//! Each worker:
//! - Pulls jobs from the shared handoff queue until it is drained and closed
//! - Moves exactly one chunk per job through a fixed-size copy buffer
//! - Counts the chunk against its file's plan; the worker completing the last
//!   chunk finalizes the file (concatenate or rename, then verify length)
//! - Records outcomes in its own [`WorkerStats`], returned on join
//!
//! Item-level errors never leave the executor: they are logged and become a
//! failed status for the chunk, file or directory.

use super::job::{Chunk, DirTarget, Job};
use super::plan::{ChunkPlan, FileStatus, PlanPaths};
use super::queue::BoundedHandoffQueue;
use super::stats::WorkerStats;
use crate::error::{StoreError, StoreResult, WorkerError};
use crate::store::RemoteStore;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// State shared by all transfer workers
pub struct TransferContext {
    pub store: Arc<dyn RemoteStore>,
    pub jobs: Arc<BoundedHandoffQueue<Job>>,

    /// Replace existing destination files
    pub overwrite: bool,

    /// Copy buffer size per worker
    pub buffer_size: usize,
}

/// A worker thread that executes transfer jobs
pub struct TransferWorker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<WorkerStats>>,

    /// Live byte counter sampled by the progress monitor
    bytes: Arc<AtomicU64>,
}

impl TransferWorker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, ctx: Arc<TransferContext>) -> Result<Self, WorkerError> {
        let bytes = Arc::new(AtomicU64::new(0));
        let stats = WorkerStats::new(Arc::clone(&bytes));

        let handle = thread::Builder::new()
            .name(format!("transfer-{}", id))
            .spawn(move || JobExecutor::new(id, ctx, stats).run())
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            bytes,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Live byte counter of this worker
    pub fn bytes_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes)
    }

    /// Wait for the worker to finish and take its statistics
    pub fn join(mut self) -> Result<WorkerStats, WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Transfer worker panicked".into(),
            }),
            None => Ok(WorkerStats::new(Arc::clone(&self.bytes))),
        }
    }
}

/// Executes jobs for one worker
pub struct JobExecutor {
    id: usize,
    ctx: Arc<TransferContext>,
    stats: WorkerStats,
    buf: Vec<u8>,
}

impl JobExecutor {
    pub fn new(id: usize, ctx: Arc<TransferContext>, stats: WorkerStats) -> Self {
        let buf = vec![0u8; ctx.buffer_size.max(1)];
        Self {
            id,
            ctx,
            stats,
            buf,
        }
    }

    /// Drain the job queue, returning this worker's statistics
    pub fn run(mut self) -> WorkerStats {
        debug!(worker = self.id, "Transfer worker starting");
        self.stats.begin();

        let jobs = Arc::clone(&self.ctx.jobs);
        while let Some(job) = jobs.poll() {
            self.execute(job);
        }

        self.stats.end();
        debug!(
            worker = self.id,
            chunks = self.stats.chunks_succeeded,
            failed_chunks = self.stats.chunks_failed,
            bytes = self.stats.bytes_transferred(),
            "Transfer worker finished"
        );
        self.stats
    }

    /// Execute a single job
    pub fn execute(&mut self, job: Job) {
        match job {
            Job::Mkdir(target) => self.make_directory(target),
            Job::Upload(chunk) => {
                let status = self.upload_chunk(&chunk);
                self.complete_chunk(&chunk, status);
            }
            Job::Download(chunk) => {
                let status = self.download_chunk(&chunk);
                self.complete_chunk(&chunk, status);
            }
        }
    }

    fn make_directory(&mut self, target: DirTarget) {
        let dir_path = target.display();
        let status = match &target {
            DirTarget::Remote(path) => match self.ctx.store.create_directory(path) {
                Ok(true) => FileStatus::Success,
                Ok(false) => {
                    warn!(worker = self.id, path = %path, "Directory not created");
                    FileStatus::Failed
                }
                Err(e) => {
                    warn!(worker = self.id, path = %path, error = %e, "Failed to create directory");
                    FileStatus::Failed
                }
            },
            DirTarget::Local(path) => match fs::create_dir_all(path) {
                Ok(()) => FileStatus::Success,
                Err(e) => {
                    warn!(worker = self.id, path = %path.display(), error = %e, "Failed to create directory");
                    FileStatus::Failed
                }
            },
        };
        trace!(worker = self.id, path = %dir_path, status = %status, "Directory job done");
        self.stats.record_item(dir_path, status);
    }

    /// Whether this chunk should be skipped because its file already exists
    fn skip(&self, plan: &ChunkPlan) -> bool {
        if self.ctx.overwrite {
            return false;
        }
        match plan.paths() {
            PlanPaths::Upload { final_path, .. } => {
                plan.exists_at_destination(|| self.ctx.store.exists(final_path))
            }
            PlanPaths::Download { final_path, .. } => {
                plan.exists_at_destination(|| final_path.try_exists())
            }
        }
    }

    fn upload_chunk(&mut self, chunk: &Chunk) -> FileStatus {
        let plan = &chunk.plan;
        if self.skip(plan) {
            return FileStatus::Skipped;
        }
        let (source, dest) = match (plan.paths(), plan.upload_chunk_path(chunk.id)) {
            (PlanPaths::Upload { source, .. }, Some(dest)) => (source.clone(), dest),
            _ => return FileStatus::Failed,
        };

        // Chunk objects have unique names; a single-chunk upload writes the
        // final path directly and must respect the overwrite policy
        let overwrite = self.ctx.overwrite || plan.splits() > 1;
        match self.copy_to_store(&source, &dest, chunk, overwrite) {
            Ok(moved) if moved == chunk.size => {
                trace!(worker = self.id, path = %dest, offset = chunk.offset, size = chunk.size, "Chunk uploaded");
                FileStatus::Success
            }
            Ok(moved) => {
                warn!(
                    worker = self.id,
                    path = %source.display(),
                    expected = chunk.size,
                    moved,
                    "Short read while uploading chunk"
                );
                FileStatus::Failed
            }
            Err(e) => {
                warn!(worker = self.id, path = %source.display(), chunk = chunk.id, error = %e, "Chunk upload failed");
                FileStatus::Failed
            }
        }
    }

    fn copy_to_store(
        &mut self,
        source: &Path,
        dest: &str,
        chunk: &Chunk,
        overwrite: bool,
    ) -> StoreResult<u64> {
        let label = source.display().to_string();
        let mut file = File::open(source).map_err(|e| StoreError::io(&label, &e))?;
        file.seek(SeekFrom::Start(chunk.offset))
            .map_err(|e| StoreError::io(&label, &e))?;

        let mut writer = self.ctx.store.open_write(dest, overwrite)?;
        let moved = copy_range(&mut file, &mut writer, chunk.size, &mut self.buf, &label, dest)?;
        if moved == chunk.size {
            writer.commit()?;
        }
        Ok(moved)
    }

    fn download_chunk(&mut self, chunk: &Chunk) -> FileStatus {
        let plan = &chunk.plan;
        if self.skip(plan) {
            return FileStatus::Skipped;
        }
        let (source, intermediate) = match plan.paths() {
            PlanPaths::Download {
                source,
                intermediate,
                ..
            } => (source.full_path.clone(), intermediate.clone()),
            PlanPaths::Upload { .. } => return FileStatus::Failed,
        };

        match self.copy_from_store(&source, &intermediate, chunk) {
            Ok(moved) if moved == chunk.size => {
                trace!(worker = self.id, path = %source, offset = chunk.offset, size = chunk.size, "Chunk downloaded");
                FileStatus::Success
            }
            Ok(moved) => {
                warn!(
                    worker = self.id,
                    path = %source,
                    expected = chunk.size,
                    moved,
                    "Short read while downloading chunk"
                );
                FileStatus::Failed
            }
            Err(e) => {
                warn!(worker = self.id, path = %source, chunk = chunk.id, error = %e, "Chunk download failed");
                FileStatus::Failed
            }
        }
    }

    fn copy_from_store(&mut self, source: &str, local: &Path, chunk: &Chunk) -> StoreResult<u64> {
        let label = local.display().to_string();
        let mut reader = self.ctx.store.open_read(source, chunk.offset)?;

        // Chunks of one file write disjoint ranges of the same local file
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(local)
            .map_err(|e| StoreError::io(&label, &e))?;
        file.seek(SeekFrom::Start(chunk.offset))
            .map_err(|e| StoreError::io(&label, &e))?;

        let moved = copy_range(&mut reader, &mut file, chunk.size, &mut self.buf, source, &label)?;
        file.flush().map_err(|e| StoreError::io(&label, &e))?;
        Ok(moved)
    }

    /// Count the chunk; the worker completing the file's last chunk finalizes it
    fn complete_chunk(&mut self, chunk: &Chunk, status: FileStatus) {
        let plan = &chunk.plan;
        if status == FileStatus::Failed {
            plan.mark_failed();
        }
        self.stats.record_chunk(status, chunk.size);

        if !plan.complete_chunk() {
            return;
        }

        let mut status = plan.status();
        let finalized = match (status, plan.paths()) {
            (FileStatus::Success, PlanPaths::Upload { .. }) => self.finalize_upload(plan),
            (FileStatus::Success, PlanPaths::Download { .. }) => self.finalize_download(plan),
            (FileStatus::Failed, _) => {
                self.discard_intermediates(plan);
                true
            }
            _ => true,
        };
        if !finalized {
            plan.mark_failed();
            self.discard_intermediates(plan);
            status = FileStatus::Failed;
        }

        let source = plan.source_display();
        match status {
            FileStatus::Failed => error!(worker = self.id, path = %source, "Transfer failed"),
            FileStatus::Skipped => debug!(worker = self.id, path = %source, "Transfer skipped, destination exists"),
            _ => debug!(worker = self.id, path = %source, dest = %plan.destination_display(), "Transfer complete"),
        }
        self.stats.record_item(source, status);
    }

    /// Concatenate chunk objects into place and verify the final length
    fn finalize_upload(&self, plan: &ChunkPlan) -> bool {
        let PlanPaths::Upload {
            final_path,
            segments_dir,
            ..
        } = plan.paths()
        else {
            return false;
        };
        let store = &self.ctx.store;

        if let (Some(segments_dir), Some(concat_path)) = (segments_dir, plan.concat_path()) {
            let chunks = plan.upload_chunk_paths();
            let joined = store.concatenate(&concat_path, &chunks).and_then(|concatenated| {
                if concatenated {
                    store.rename(&concat_path, final_path, true)
                } else {
                    Ok(false)
                }
            });
            match joined {
                Ok(true) => {}
                Ok(false) => {
                    warn!(worker = self.id, path = %final_path, "Concatenation did not complete");
                    return false;
                }
                Err(e) => {
                    warn!(worker = self.id, path = %final_path, error = %e, "Concatenation failed");
                    return false;
                }
            }
            if let Err(e) = store.delete(segments_dir) {
                debug!(worker = self.id, path = %segments_dir, error = %e, "Could not remove segment directory");
            }
        }

        match store.get_entry(final_path) {
            Ok(entry) if entry.length == plan.length() => true,
            Ok(entry) => {
                warn!(
                    worker = self.id,
                    path = %final_path,
                    expected = plan.length(),
                    actual = entry.length,
                    "Final verification failed"
                );
                false
            }
            Err(e) => {
                warn!(worker = self.id, path = %final_path, error = %e, "Final verification failed");
                false
            }
        }
    }

    /// Rename the local intermediate file into place and verify its length
    fn finalize_download(&self, plan: &ChunkPlan) -> bool {
        let PlanPaths::Download {
            intermediate,
            final_path,
            ..
        } = plan.paths()
        else {
            return false;
        };

        if let Err(e) = fs::rename(intermediate, final_path) {
            warn!(worker = self.id, path = %final_path.display(), error = %e, "Rename failed");
            return false;
        }

        match fs::metadata(final_path) {
            Ok(meta) if meta.len() == plan.length() => true,
            Ok(meta) => {
                warn!(
                    worker = self.id,
                    path = %final_path.display(),
                    expected = plan.length(),
                    actual = meta.len(),
                    "Final verification failed"
                );
                false
            }
            Err(e) => {
                warn!(worker = self.id, path = %final_path.display(), error = %e, "Final verification failed");
                false
            }
        }
    }

    /// Best-effort removal of a failed file's intermediate objects
    fn discard_intermediates(&self, plan: &ChunkPlan) {
        match plan.paths() {
            PlanPaths::Upload {
                segments_dir: Some(dir),
                ..
            } => {
                let _ = self.ctx.store.delete(dir);
                if let Some(concat_path) = plan.concat_path() {
                    let _ = self.ctx.store.delete(&concat_path);
                }
            }
            PlanPaths::Download { intermediate, .. } => {
                let _ = fs::remove_file(intermediate);
            }
            _ => {}
        }
    }
}

/// Copy up to `size` bytes from `src` to `dst` through `buf`
///
/// Returns the number of bytes moved, which is less than `size` only if the
/// source ended early.
fn copy_range<R, W>(
    src: &mut R,
    dst: &mut W,
    size: u64,
    buf: &mut [u8],
    src_label: &str,
    dst_label: &str,
) -> StoreResult<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut moved = 0u64;
    while moved < size {
        let want = (size - moved).min(buf.len() as u64) as usize;
        let n = match src.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::io(src_label, &e)),
        };
        dst.write_all(&buf[..n])
            .map_err(|e| StoreError::io(dst_label, &e))?;
        moved += n as u64;
    }
    Ok(moved)
}

/// Spawn `count` workers over a shared context
pub fn spawn_workers(count: usize, ctx: &Arc<TransferContext>) -> Result<Vec<TransferWorker>, WorkerError> {
    let mut workers = Vec::with_capacity(count);
    for id in 0..count {
        workers.push(TransferWorker::spawn(id, Arc::clone(ctx))?);
    }
    info!(workers = count, "Transfer workers started");
    Ok(workers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::FaultOp;
    use crate::store::MemoryStore;
    use crate::walker::job::Direction;
    use crate::walker::plan::ChunkSizing;
    use std::path::PathBuf;

    /// Context whose queue is already closed, so `run` returns the stats at once
    fn context(store: Arc<MemoryStore>, overwrite: bool) -> Arc<TransferContext> {
        let jobs = Arc::new(BoundedHandoffQueue::new(64, true));
        jobs.mark_done();
        Arc::new(TransferContext {
            store,
            jobs,
            overwrite,
            buffer_size: 7,
        })
    }

    fn executor(ctx: &Arc<TransferContext>) -> JobExecutor {
        JobExecutor::new(0, Arc::clone(ctx), WorkerStats::new(Arc::new(AtomicU64::new(0))))
    }

    fn local_file(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.join(name);
        fs::write(&path, &data).unwrap();
        (path, data)
    }

    #[test]
    fn test_copy_range_stops_at_size() {
        let mut src = io::Cursor::new(vec![1u8; 100]);
        let mut dst = Vec::new();
        let mut buf = [0u8; 8];
        let moved = copy_range(&mut src, &mut dst, 30, &mut buf, "src", "dst").unwrap();
        assert_eq!(moved, 30);
        assert_eq!(dst.len(), 30);

        let mut short = io::Cursor::new(vec![1u8; 10]);
        let moved = copy_range(&mut short, &mut Vec::new(), 30, &mut buf, "src", "dst").unwrap();
        assert_eq!(moved, 10);
    }

    #[test]
    fn test_multi_chunk_upload_finalizes_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, data) = local_file(dir.path(), "big.bin", 250);
        let store = Arc::new(MemoryStore::new());
        let ctx = context(Arc::clone(&store), false);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 250, "/dst", &sizing));
        let mut exec = executor(&ctx);
        for job in Job::chunks_of(&plan, sizing.layout(250), Direction::Upload).into_iter().rev() {
            exec.execute(job);
        }

        assert_eq!(store.read_file("/dst/big.bin").unwrap(), data);
        assert!(!store.contains(&format!("/dst/big.bin-segments-{}", plan.token())));
        assert!(!store.contains(&format!("/dst/{}", plan.token())));

        let stats = exec.run();
        assert_eq!(stats.chunks_succeeded, 3);
        assert_eq!(stats.successful.len(), 1);
        assert_eq!(stats.bytes_transferred(), 250);
    }

    #[test]
    fn test_existing_destination_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _) = local_file(dir.path(), "f.txt", 10);
        let store = Arc::new(MemoryStore::new());
        store.put_file("/dst/f.txt", b"old".to_vec()).unwrap();
        let ctx = context(Arc::clone(&store), false);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 10, "/dst", &sizing));
        let mut exec = executor(&ctx);
        for job in Job::chunks_of(&plan, sizing.layout(10), Direction::Upload) {
            exec.execute(job);
        }

        assert_eq!(store.read_file("/dst/f.txt").unwrap(), b"old");
        let stats = exec.run();
        assert_eq!(stats.skipped.len(), 1);
        assert_eq!(stats.chunks_succeeded, 0);
    }

    #[test]
    fn test_failed_chunk_poisons_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _) = local_file(dir.path(), "f.bin", 200);
        let store = Arc::new(MemoryStore::new());
        let ctx = context(Arc::clone(&store), true);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 200, "/dst", &sizing));
        store.inject_fault(
            FaultOp::Write,
            &plan.upload_chunk_path(1).unwrap(),
            StoreError::Remote {
                status: 503,
                path: "chunk".into(),
                message: "unavailable".into(),
            },
        );

        let mut exec = executor(&ctx);
        for job in Job::chunks_of(&plan, sizing.layout(200), Direction::Upload) {
            exec.execute(job);
        }

        assert_eq!(plan.status(), FileStatus::Failed);
        assert!(!store.contains("/dst/f.bin"));
        let stats = exec.run();
        assert_eq!(stats.chunks_succeeded, 1);
        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.failed.len(), 1);
    }

    fn remote_error(path: &str) -> StoreError {
        StoreError::Remote {
            status: 500,
            path: path.into(),
            message: "InternalError".into(),
        }
    }

    /// Execute every chunk of the plan in order
    fn upload_all(exec: &mut JobExecutor, plan: &Arc<ChunkPlan>, sizing: &ChunkSizing) {
        for job in Job::chunks_of(plan, sizing.layout(plan.length()), Direction::Upload) {
            exec.execute(job);
        }
    }

    #[test]
    fn test_concatenate_failure_discards_segments() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _) = local_file(dir.path(), "big.bin", 250);
        let store = Arc::new(MemoryStore::new());
        let ctx = context(Arc::clone(&store), true);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 250, "/dst", &sizing));
        let concat_path = plan.concat_path().unwrap();
        store.inject_fault(FaultOp::Concatenate, &concat_path, remote_error(&concat_path));

        let mut exec = executor(&ctx);
        upload_all(&mut exec, &plan, &sizing);

        assert_eq!(plan.status(), FileStatus::Failed);
        assert!(!store.contains("/dst/big.bin"));
        assert!(!store.contains(&format!("/dst/big.bin-segments-{}", plan.token())));
        assert!(!store.contains(&concat_path));

        let stats = exec.run();
        assert_eq!(stats.chunks_succeeded, 3);
        assert_eq!(stats.failed.len(), 1);
        assert!(stats.successful.is_empty());
    }

    #[test]
    fn test_rename_failure_discards_concatenated_object() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _) = local_file(dir.path(), "big.bin", 250);
        let store = Arc::new(MemoryStore::new());
        let ctx = context(Arc::clone(&store), true);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 250, "/dst", &sizing));
        let concat_path = plan.concat_path().unwrap();
        store.inject_fault(FaultOp::Rename, &concat_path, remote_error(&concat_path));

        let mut exec = executor(&ctx);
        upload_all(&mut exec, &plan, &sizing);

        assert_eq!(plan.status(), FileStatus::Failed);
        assert!(!store.contains("/dst/big.bin"));
        assert!(!store.contains(&format!("/dst/big.bin-segments-{}", plan.token())));
        assert!(!store.contains(&concat_path));
        assert_eq!(exec.run().failed.len(), 1);
    }

    #[test]
    fn test_overwrite_never_replaces_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _) = local_file(dir.path(), "f.bin", 250);
        let store = Arc::new(MemoryStore::new());
        store.put_file("/dst/f.bin/precious/keep.txt", b"keep".to_vec()).unwrap();
        let ctx = context(Arc::clone(&store), true);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 250, "/dst", &sizing));
        let mut exec = executor(&ctx);
        upload_all(&mut exec, &plan, &sizing);

        assert_eq!(plan.status(), FileStatus::Failed);
        assert_eq!(store.read_file("/dst/f.bin/precious/keep.txt").unwrap(), b"keep");
        assert!(!store.contains(&plan.concat_path().unwrap()));
        assert_eq!(exec.run().failed.len(), 1);
    }

    #[test]
    fn test_short_local_file_fails_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        // Planned at 250 bytes, but only 150 are on disk
        let (path, _) = local_file(dir.path(), "shrunk.bin", 150);
        let store = Arc::new(MemoryStore::new());
        let ctx = context(Arc::clone(&store), false);

        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(path, 250, "/dst", &sizing));
        let mut exec = executor(&ctx);
        upload_all(&mut exec, &plan, &sizing);

        assert_eq!(plan.status(), FileStatus::Failed);
        assert!(!store.contains("/dst/shrunk.bin"));
        assert!(!store.contains(&format!("/dst/shrunk.bin-segments-{}", plan.token())));

        let stats = exec.run();
        assert_eq!(stats.chunks_succeeded, 1);
        assert_eq!(stats.chunks_failed, 2);
        assert_eq!(stats.failed.len(), 1);
    }

    #[test]
    fn test_download_writes_ranges_and_renames() {
        let store = Arc::new(MemoryStore::new());
        let data: Vec<u8> = (0..230u32).map(|i| i as u8).collect();
        store.put_file("/remote/x.bin", data.clone()).unwrap();
        let ctx = context(Arc::clone(&store), false);

        let out = tempfile::TempDir::new().unwrap();
        let sizing = ChunkSizing::new(100, 100);
        let entry = store.get_entry("/remote/x.bin").unwrap();
        let plan = Arc::new(ChunkPlan::for_download(entry, out.path(), &sizing).unwrap());

        let mut exec = executor(&ctx);
        for job in Job::chunks_of(&plan, sizing.layout(230), Direction::Download).into_iter().rev() {
            exec.execute(job);
        }

        assert_eq!(fs::read(out.path().join("x.bin")).unwrap(), data);
        assert!(!out.path().join(format!("x.bin-{}", plan.token())).exists());
        assert_eq!(plan.status(), FileStatus::Success);
    }

    #[test]
    fn test_mkdir_jobs() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(Arc::clone(&store), false);
        let out = tempfile::TempDir::new().unwrap();

        let mut exec = executor(&ctx);
        exec.execute(Job::Mkdir(DirTarget::Remote("/a/empty".into())));
        exec.execute(Job::Mkdir(DirTarget::Local(out.path().join("e"))));

        assert!(store.get_entry("/a/empty").unwrap().kind.is_dir());
        assert!(out.path().join("e").is_dir());
        assert_eq!(exec.run().successful.len(), 2);
    }
}
