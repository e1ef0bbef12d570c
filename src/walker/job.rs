//! Transfer jobs
//!
//! One [`Job`] per unit of work in the handoff queue. Chunk jobs order by
//! size so a max-heap queue hands out the largest chunks first.

use super::plan::ChunkPlan;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

/// Directory to create for an empty source directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirTarget {
    /// Remote directory (upload)
    Remote(String),
    /// Local directory (download)
    Local(PathBuf),
}

impl DirTarget {
    pub fn display(&self) -> String {
        match self {
            DirTarget::Remote(p) => p.clone(),
            DirTarget::Local(p) => p.display().to_string(),
        }
    }
}

/// Transfer direction of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local filesystem to store
    Upload,
    /// Store to local filesystem
    Download,
}

/// One byte range of a planned file
#[derive(Debug, Clone)]
pub struct Chunk {
    pub plan: Arc<ChunkPlan>,

    /// 0-based chunk index
    pub id: u64,

    /// Byte offset in the source file
    pub offset: u64,

    /// Number of bytes in this chunk
    pub size: u64,
}

/// A unit of work for a transfer worker
#[derive(Debug, Clone)]
pub enum Job {
    Mkdir(DirTarget),
    Upload(Chunk),
    Download(Chunk),
}

impl Job {
    /// Number of bytes this job moves (0 for directory creation)
    pub fn size(&self) -> u64 {
        match self {
            Job::Mkdir(_) => 0,
            Job::Upload(c) | Job::Download(c) => c.size,
        }
    }

    /// Jobs for every chunk of `plan`, in offset order
    pub fn chunks_of(
        plan: &Arc<ChunkPlan>,
        layout: impl Iterator<Item = (u64, u64)>,
        direction: Direction,
    ) -> Vec<Job> {
        layout
            .enumerate()
            .map(|(id, (offset, size))| {
                let chunk = Chunk {
                    plan: Arc::clone(plan),
                    id: id as u64,
                    offset,
                    size,
                };
                match direction {
                    Direction::Upload => Job::Upload(chunk),
                    Direction::Download => Job::Download(chunk),
                }
            })
            .collect()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size()
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size().cmp(&other.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::plan::ChunkSizing;
    use crate::walker::queue::BoundedHandoffQueue;

    #[test]
    fn test_chunks_of_plan() {
        let sizing = ChunkSizing::new(100, 100);
        let plan = Arc::new(ChunkPlan::for_upload(PathBuf::from("/src/f"), 250, "/d", &sizing));
        let jobs = Job::chunks_of(&plan, sizing.layout(250), Direction::Upload);

        assert_eq!(jobs.len(), 3);
        let sizes: Vec<u64> = jobs.iter().map(Job::size).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        match &jobs[2] {
            Job::Upload(c) => {
                assert_eq!(c.id, 2);
                assert_eq!(c.offset, 200);
            }
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[test]
    fn test_largest_chunk_first() {
        let sizing = ChunkSizing::new(100, 100);
        let small = Arc::new(ChunkPlan::for_upload(PathBuf::from("/s"), 10, "/d", &sizing));
        let big = Arc::new(ChunkPlan::for_upload(PathBuf::from("/b"), 90, "/d", &sizing));

        let queue = BoundedHandoffQueue::new(10, true);
        queue.put(Job::Mkdir(DirTarget::Remote("/d/empty".into())));
        for job in Job::chunks_of(&small, sizing.layout(10), Direction::Upload) {
            queue.put(job);
        }
        for job in Job::chunks_of(&big, sizing.layout(90), Direction::Upload) {
            queue.put(job);
        }
        queue.mark_done();

        let sizes: Vec<u64> = std::iter::from_fn(|| queue.poll()).map(|j| j.size()).collect();
        assert_eq!(sizes, vec![90, 10, 0]);
    }
}
