//! Per-file chunk planning
//!
//! A [`ChunkPlan`] is created once per source file by the enumerator and
//! shared (via `Arc`) by every chunk job of that file. Workers mutate it
//! concurrently:
//!
//! - the completion counter is a plain atomic; the worker whose increment
//!   reaches the split count is the single finalizer for the file
//! - the aggregate status and the memoized existence check live behind one
//!   mutex, so the destination is checked at most once per file
//!
//! # Intermediate layout
//!
//! ```text
//! upload, 1 chunk:    <dest>/<name>                      (written in place)
//! upload, N chunks:   <dest>/<name>-segments-<token>/<name>-<id>
//!                     concatenated into <dest>/<token>, renamed to <dest>/<name>
//! download:           <dest>/<name>-<token>              (renamed to <dest>/<name>)
//! ```

use crate::store::types::{join_path, DirectoryEntry};
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use uuid::Uuid;

/// Chunk size and fold threshold used to split files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizing {
    /// Size of every full chunk
    pub chunk_size: u64,

    /// Files up to this length are sent as a single chunk, and a trailing
    /// remainder is folded into the last full chunk while the combined size
    /// stays within it. Must be at least `chunk_size`.
    pub threshold: u64,
}

impl ChunkSizing {
    pub fn new(chunk_size: u64, threshold: u64) -> Self {
        Self {
            chunk_size,
            threshold,
        }
    }

    /// Number of chunks a file of `len` bytes is split into (always >= 1)
    pub fn chunk_count(&self, len: u64) -> u64 {
        if len <= self.threshold {
            return 1;
        }
        let c = self.chunk_size;
        if len % c <= self.threshold - c {
            len / c
        } else {
            len.div_ceil(c)
        }
    }

    /// `(offset, size)` of every chunk of a file of `len` bytes
    ///
    /// All chunks but the last are exactly `chunk_size`; the last one takes
    /// whatever remains, so the sizes always sum to `len`.
    pub fn layout(&self, len: u64) -> ChunkLayout {
        ChunkLayout {
            len,
            chunk_size: self.chunk_size,
            count: self.chunk_count(len),
            next: 0,
        }
    }
}

/// Iterator over the chunk ranges of one file
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    len: u64,
    chunk_size: u64,
    count: u64,
    next: u64,
}

impl Iterator for ChunkLayout {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let offset = self.next * self.chunk_size;
        let size = if self.next + 1 == self.count {
            self.len - offset
        } else {
            self.chunk_size
        };
        self.next += 1;
        Some((offset, size))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkLayout {}

/// Outcome of a file or directory job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Chunks still outstanding
    Pending,
    Success,
    Failed,
    /// Destination already existed and overwrite was not requested
    Skipped,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Source and destination paths of a plan
#[derive(Debug, Clone)]
pub enum PlanPaths {
    Upload {
        /// Local source file
        source: PathBuf,
        /// Remote destination directory
        dest_dir: String,
        /// Remote final path
        final_path: String,
        /// Remote directory holding the chunk objects (multi-chunk only)
        segments_dir: Option<String>,
    },
    Download {
        /// Remote source entry
        source: DirectoryEntry,
        /// Local destination directory
        dest_dir: PathBuf,
        /// Local file the chunks are written into
        intermediate: PathBuf,
        /// Local final path
        final_path: PathBuf,
    },
}

#[derive(Debug)]
struct PlanState {
    failed: bool,
    exists: Option<bool>,
}

/// Bookkeeping for one source file
#[derive(Debug)]
pub struct ChunkPlan {
    paths: PlanPaths,
    name: String,
    token: Uuid,
    length: u64,
    splits: u64,
    completed: AtomicU64,
    state: Mutex<PlanState>,
}

impl ChunkPlan {
    fn with_paths(paths: PlanPaths, name: String, token: Uuid, length: u64, splits: u64) -> Self {
        Self {
            paths,
            name,
            token,
            length,
            splits,
            completed: AtomicU64::new(0),
            state: Mutex::new(PlanState {
                failed: false,
                exists: None,
            }),
        }
    }

    /// Plan the upload of local file `source` into remote directory `dest_dir`
    pub fn for_upload(source: PathBuf, length: u64, dest_dir: &str, sizing: &ChunkSizing) -> Self {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let token = Uuid::new_v4();
        let splits = sizing.chunk_count(length);
        let final_path = join_path(dest_dir, &name);
        let segments_dir =
            (splits > 1).then(|| join_path(dest_dir, &format!("{}-segments-{}", name, token)));

        let paths = PlanPaths::Upload {
            source,
            dest_dir: dest_dir.to_string(),
            final_path,
            segments_dir,
        };
        Self::with_paths(paths, name, token, length, splits)
    }

    /// Plan the download of remote file `entry` into local directory `dest_dir`
    ///
    /// Creates `dest_dir` if it does not exist yet.
    pub fn for_download(
        entry: DirectoryEntry,
        dest_dir: &Path,
        sizing: &ChunkSizing,
    ) -> io::Result<Self> {
        if !dest_dir.exists() {
            fs::create_dir_all(dest_dir)?;
        }
        let name = entry.name.clone();
        let token = Uuid::new_v4();
        let length = entry.length;
        let splits = sizing.chunk_count(length);

        let paths = PlanPaths::Download {
            intermediate: dest_dir.join(format!("{}-{}", name, token)),
            final_path: dest_dir.join(&name),
            dest_dir: dest_dir.to_path_buf(),
            source: entry,
        };
        Ok(Self::with_paths(paths, name, token, length, splits))
    }

    pub fn paths(&self) -> &PlanPaths {
        &self.paths
    }

    /// Source file name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique token of this plan's intermediate objects
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Expected length of the source file
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Number of chunks
    pub fn splits(&self) -> u64 {
        self.splits
    }

    /// Source path as shown in reports
    pub fn source_display(&self) -> String {
        match &self.paths {
            PlanPaths::Upload { source, .. } => source.display().to_string(),
            PlanPaths::Download { source, .. } => source.full_path.clone(),
        }
    }

    /// Destination path as shown in logs
    pub fn destination_display(&self) -> String {
        match &self.paths {
            PlanPaths::Upload { final_path, .. } => final_path.clone(),
            PlanPaths::Download { final_path, .. } => final_path.display().to_string(),
        }
    }

    /// Remote path a given upload chunk is written to
    pub fn upload_chunk_path(&self, id: u64) -> Option<String> {
        match &self.paths {
            PlanPaths::Upload {
                final_path,
                segments_dir,
                ..
            } => Some(match segments_dir {
                Some(dir) => join_path(dir, &format!("{}-{}", self.name, id)),
                None => final_path.clone(),
            }),
            PlanPaths::Download { .. } => None,
        }
    }

    /// Remote paths of all upload chunks, in order
    pub fn upload_chunk_paths(&self) -> Vec<String> {
        (0..self.splits)
            .filter_map(|id| self.upload_chunk_path(id))
            .collect()
    }

    /// Remote path the chunks are concatenated into before the final rename
    pub fn concat_path(&self) -> Option<String> {
        match &self.paths {
            PlanPaths::Upload { dest_dir, .. } => Some(join_path(dest_dir, &self.token.to_string())),
            PlanPaths::Download { .. } => None,
        }
    }

    /// Record a failed chunk or finalization; sticky
    pub fn mark_failed(&self) {
        self.state.lock().failed = true;
    }

    /// Count one finished chunk (any outcome)
    ///
    /// Returns `true` for exactly one caller: the one completing the last chunk.
    pub fn complete_chunk(&self) -> bool {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1 == self.splits
    }

    /// Number of chunks counted so far
    pub fn completed_chunks(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether the final destination already exists, checked at most once
    ///
    /// The lock is held across `check`, so concurrent callers wait for the
    /// first result instead of issuing their own check. A failing check
    /// counts as "exists": the file is skipped rather than overwritten.
    pub fn exists_at_destination<E, F>(&self, check: F) -> bool
    where
        E: fmt::Display,
        F: FnOnce() -> Result<bool, E>,
    {
        let mut state = self.state.lock();
        if let Some(exists) = state.exists {
            return exists;
        }
        let exists = match check() {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    path = %self.destination_display(),
                    error = %e,
                    "Existence check failed, skipping file"
                );
                true
            }
        };
        state.exists = Some(exists);
        exists
    }

    /// Aggregate status of the file
    pub fn status(&self) -> FileStatus {
        let state = self.state.lock();
        if state.exists == Some(true) {
            FileStatus::Skipped
        } else if state.failed {
            FileStatus::Failed
        } else if self.completed_chunks() < self.splits {
            FileStatus::Pending
        } else {
            FileStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const MB: u64 = 1_000_000;

    fn sizing(chunk: u64, threshold: u64) -> ChunkSizing {
        ChunkSizing::new(chunk, threshold)
    }

    #[test]
    fn test_chunk_count_formula() {
        let s = sizing(MB, MB);
        assert_eq!(s.chunk_count(0), 1);
        assert_eq!(s.chunk_count(MB), 1);
        assert_eq!(s.chunk_count(MB + 1), 2);
        assert_eq!(s.chunk_count(1_500_000), 2);
        assert_eq!(s.chunk_count(3 * MB), 3);

        // Remainder up to threshold - chunk folds into the last chunk
        let s = sizing(MB, 1_500_000);
        assert_eq!(s.chunk_count(1_500_000), 1);
        assert_eq!(s.chunk_count(2_400_000), 2);
        assert_eq!(s.chunk_count(2_600_000), 3);
    }

    #[test]
    fn test_layout_matches_count_and_sums_to_length() {
        let cases = [
            (MB, MB),
            (MB, 1_500_000),
            (MB, 2_500_000),
            (4096, 4096),
            (4096, 10_000),
        ];
        let lengths = [0, 1, 4095, 4096, 4097, 999_999, MB, MB + 1, 1_500_000, 3_200_000, 7_654_321];

        for (chunk, threshold) in cases {
            let s = sizing(chunk, threshold);
            for len in lengths {
                let chunks: Vec<_> = s.layout(len).collect();
                assert_eq!(chunks.len() as u64, s.chunk_count(len), "len {} sizing {:?}", len, s);
                assert_eq!(chunks.iter().map(|c| c.1).sum::<u64>(), len);

                let small = chunks.iter().filter(|c| c.1 < chunk).count();
                assert!(small <= 1, "len {} sizing {:?}", len, s);

                let mut expected_offset = 0;
                for (offset, size) in &chunks {
                    assert_eq!(*offset, expected_offset);
                    expected_offset += size;
                }
            }
        }
    }

    #[test]
    fn test_empty_file_has_one_empty_chunk() {
        let chunks: Vec<_> = sizing(MB, MB).layout(0).collect();
        assert_eq!(chunks, vec![(0, 0)]);
    }

    #[test]
    fn test_upload_paths() {
        let single = ChunkPlan::for_upload(PathBuf::from("/tmp/a.bin"), 10, "/dst/", &sizing(MB, MB));
        assert_eq!(single.splits(), 1);
        assert_eq!(single.upload_chunk_path(0).unwrap(), "/dst/a.bin");
        assert_eq!(single.destination_display(), "/dst/a.bin");

        let split = ChunkPlan::for_upload(
            PathBuf::from("/tmp/a.bin"),
            1_500_000,
            "/dst",
            &sizing(MB, MB),
        );
        let token = split.token();
        assert_eq!(split.splits(), 2);
        assert_eq!(
            split.upload_chunk_paths(),
            vec![
                format!("/dst/a.bin-segments-{}/a.bin-0", token),
                format!("/dst/a.bin-segments-{}/a.bin-1", token),
            ]
        );
        assert_eq!(split.concat_path().unwrap(), format!("/dst/{}", token));
    }

    #[test]
    fn test_download_paths_create_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("nested/out");
        let entry = DirectoryEntry::file("/remote/f.txt", 5);

        let plan = ChunkPlan::for_download(entry, &dest, &sizing(MB, MB)).unwrap();
        assert!(dest.is_dir());
        match plan.paths() {
            PlanPaths::Download {
                intermediate,
                final_path,
                ..
            } => {
                assert_eq!(final_path, &dest.join("f.txt"));
                assert_eq!(
                    intermediate,
                    &dest.join(format!("f.txt-{}", plan.token()))
                );
            }
            PlanPaths::Upload { .. } => panic!("expected download paths"),
        }
        assert!(plan.upload_chunk_path(0).is_none());
    }

    #[test]
    fn test_exactly_one_finalizer() {
        const SPLITS: u64 = 64;
        let plan = Arc::new(ChunkPlan::for_upload(
            PathBuf::from("/f"),
            SPLITS * 10,
            "/d",
            &sizing(10, 10),
        ));
        assert_eq!(plan.splits(), SPLITS);

        let finalizers: usize = (0..SPLITS)
            .map(|_| {
                let plan = Arc::clone(&plan);
                thread::spawn(move || plan.complete_chunk() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();

        assert_eq!(finalizers, 1);
        assert_eq!(plan.completed_chunks(), SPLITS);
    }

    #[test]
    fn test_existence_check_memoized() {
        let plan = Arc::new(ChunkPlan::for_upload(PathBuf::from("/f"), 100, "/d", &sizing(10, 10)));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..plan.splits())
            .map(|_| {
                let plan = Arc::clone(&plan);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    plan.exists_at_destination(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Ok::<_, io::Error>(false)
                    })
                })
            })
            .collect();

        for h in handles {
            assert!(!h.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_existence_check_skips() {
        let plan = ChunkPlan::for_upload(PathBuf::from("/f"), 1, "/d", &sizing(10, 10));
        assert!(plan.exists_at_destination(|| Err::<bool, _>("timeout")));
        assert_eq!(plan.status(), FileStatus::Skipped);
    }

    #[test]
    fn test_failure_is_sticky() {
        let plan = ChunkPlan::for_upload(PathBuf::from("/f"), 30, "/d", &sizing(10, 10));
        assert_eq!(plan.status(), FileStatus::Pending);

        assert!(!plan.complete_chunk());
        plan.mark_failed();
        assert!(!plan.complete_chunk());
        assert!(plan.complete_chunk());
        assert_eq!(plan.status(), FileStatus::Failed);
    }

    #[test]
    fn test_success_after_all_chunks() {
        let plan = ChunkPlan::for_upload(PathBuf::from("/f"), 20, "/d", &sizing(10, 10));
        plan.exists_at_destination(|| Ok::<_, io::Error>(false));
        plan.complete_chunk();
        assert_eq!(plan.status(), FileStatus::Pending);
        plan.complete_chunk();
        assert_eq!(plan.status(), FileStatus::Success);
    }
}
