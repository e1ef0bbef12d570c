//! In-memory store backend
//!
//! Thread-safe via a single mutex around the namespace. Used by the test
//! suites and benches, and supports fault injection so item-level failure
//! paths of the engine can be exercised deterministically.

use super::acl::{apply_acl_spec, AclEntry, AclMode};
use super::types::{file_name, join_path, normalize_path, parent_path, DirectoryEntry, ListPage};
use super::{validate_path, ByteSource, ObjectWriter, RemoteStore};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io::{self, Read, Write};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store operation that a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    GetEntry,
    List,
    CreateDirectory,
    Read,
    Write,
    Concatenate,
    Rename,
    ApplyAcl,
}

#[derive(Debug)]
enum Node {
    File {
        data: Arc<Vec<u8>>,
        acl: Vec<AclEntry>,
    },
    Dir {
        children: BTreeSet<String>,
        acl: Vec<AclEntry>,
    },
}

impl Node {
    fn empty_dir() -> Self {
        Node::Dir {
            children: BTreeSet::new(),
            acl: Vec::new(),
        }
    }

    fn to_entry(&self, path: &str) -> DirectoryEntry {
        match self {
            Node::File { data, .. } => DirectoryEntry::file(path, data.len() as u64),
            Node::Dir { .. } => DirectoryEntry::directory(path),
        }
    }
}

#[derive(Debug)]
struct Namespace {
    nodes: HashMap<String, Node>,
}

impl Namespace {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::empty_dir());
        Self { nodes }
    }

    /// Create `path` and missing parents as directories
    fn ensure_dir(&mut self, path: &str) -> StoreResult<()> {
        match self.nodes.get(path) {
            Some(Node::Dir { .. }) => return Ok(()),
            Some(Node::File { .. }) => {
                return Err(StoreError::NotADirectory {
                    path: path.to_string(),
                })
            }
            None => {}
        }
        if let Some(parent) = parent_path(path) {
            self.ensure_dir(&parent)?;
            self.link(&parent, path);
        }
        self.nodes.insert(path.to_string(), Node::empty_dir());
        Ok(())
    }

    fn link(&mut self, parent: &str, path: &str) {
        if let Some(Node::Dir { children, .. }) = self.nodes.get_mut(parent) {
            children.insert(file_name(path).to_string());
        }
    }

    fn unlink(&mut self, path: &str) {
        if let Some(parent) = parent_path(path) {
            if let Some(Node::Dir { children, .. }) = self.nodes.get_mut(&parent) {
                children.remove(file_name(path));
            }
        }
    }

    fn put_file(&mut self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        if let Some(Node::Dir { .. }) = self.nodes.get(path) {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
            });
        }
        if let Some(parent) = parent_path(path) {
            self.ensure_dir(&parent)?;
            self.link(&parent, path);
        }
        self.nodes.insert(
            path.to_string(),
            Node::File {
                data: Arc::new(data),
                acl: Vec::new(),
            },
        );
        Ok(())
    }

    /// Remove `path` and its whole subtree, returning the removed nodes keyed by path
    fn take_subtree(&mut self, path: &str) -> Vec<(String, Node)> {
        let prefix = format!("{}/", path);
        let keys: Vec<String> = self
            .nodes
            .keys()
            .filter(|k| k.as_str() == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        self.unlink(path);
        keys.into_iter()
            .filter_map(|k| self.nodes.remove(&k).map(|n| (k, n)))
            .collect()
    }
}

/// In-memory [`RemoteStore`] implementation
pub struct MemoryStore {
    ns: Arc<Mutex<Namespace>>,
    faults: Mutex<HashMap<(FaultOp, String), StoreError>>,
    acl_calls: Mutex<HashMap<String, usize>>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            ns: Arc::new(Mutex::new(Namespace::new())),
            faults: Mutex::new(HashMap::new()),
            acl_calls: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Insert a file, creating parent directories
    pub fn put_file(&self, path: &str, data: impl Into<Vec<u8>>) -> StoreResult<()> {
        validate_path(path)?;
        self.ns.lock().put_file(&normalize_path(path), data.into())
    }

    /// Insert a directory, creating parent directories
    pub fn put_dir(&self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        self.ns.lock().ensure_dir(&normalize_path(path))
    }

    /// Contents of a file, if present
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match self.ns.lock().nodes.get(&normalize_path(path)) {
            Some(Node::File { data, .. }) => Some(data.as_ref().clone()),
            _ => None,
        }
    }

    /// Current ACL of an entry, if present
    pub fn acl(&self, path: &str) -> Option<Vec<AclEntry>> {
        match self.ns.lock().nodes.get(&normalize_path(path)) {
            Some(Node::File { acl, .. }) | Some(Node::Dir { acl, .. }) => Some(acl.clone()),
            None => None,
        }
    }

    /// Whether `path` exists
    pub fn contains(&self, path: &str) -> bool {
        self.ns.lock().nodes.contains_key(&normalize_path(path))
    }

    /// Number of entries (files and directories, root included)
    pub fn len(&self) -> usize {
        self.ns.lock().nodes.len()
    }

    /// Always false: the root directory is always present
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Fail every `op` on `path` with `err`
    pub fn inject_fault(&self, op: FaultOp, path: &str, err: StoreError) {
        self.faults.lock().insert((op, normalize_path(path)), err);
    }

    /// Number of `apply_acl` calls made for `path`
    pub fn acl_calls(&self, path: &str) -> usize {
        self.acl_calls
            .lock()
            .get(&normalize_path(path))
            .copied()
            .unwrap_or(0)
    }

    /// Total `apply_acl` calls across all paths
    pub fn total_acl_calls(&self) -> usize {
        self.acl_calls.lock().values().sum()
    }

    /// Number of `get_entry` calls served
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn check_fault(&self, op: FaultOp, path: &str) -> StoreResult<()> {
        match self.faults.lock().get(&(op, path.to_string())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn resolve(&self, op: FaultOp, path: &str) -> StoreResult<String> {
        validate_path(path)?;
        let path = normalize_path(path);
        self.check_fault(op, &path)?;
        Ok(path)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    fn get_entry(&self, path: &str) -> StoreResult<DirectoryEntry> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let path = self.resolve(FaultOp::GetEntry, path)?;
        let ns = self.ns.lock();
        ns.nodes
            .get(&path)
            .map(|n| n.to_entry(&path))
            .ok_or(StoreError::NotFound { path })
    }

    fn list_children(
        &self,
        path: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        let path = self.resolve(FaultOp::List, path)?;
        let ns = self.ns.lock();
        let children = match ns.nodes.get(&path) {
            Some(Node::Dir { children, .. }) => children,
            Some(Node::File { .. }) => return Err(StoreError::NotADirectory { path }),
            None => return Err(StoreError::NotFound { path }),
        };

        let start = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };
        let page_size = page_size.max(1);
        let entries: Vec<DirectoryEntry> = children
            .range((start, Bound::Unbounded))
            .take(page_size)
            .filter_map(|name| {
                let child = join_path(&path, name);
                ns.nodes.get(&child).map(|n| n.to_entry(&child))
            })
            .collect();

        let continuation = if entries.len() == page_size {
            entries.last().map(|e| e.name.clone())
        } else {
            None
        };
        Ok(ListPage {
            entries,
            continuation,
        })
    }

    fn create_directory(&self, path: &str) -> StoreResult<bool> {
        let path = self.resolve(FaultOp::CreateDirectory, path)?;
        match self.ns.lock().ensure_dir(&path) {
            Ok(()) => Ok(true),
            Err(StoreError::NotADirectory { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn open_read(&self, path: &str, offset: u64) -> StoreResult<ByteSource> {
        let path = self.resolve(FaultOp::Read, path)?;
        let ns = self.ns.lock();
        match ns.nodes.get(&path) {
            Some(Node::File { data, .. }) => Ok(Box::new(MemReader {
                data: Arc::clone(data),
                pos: (offset as usize).min(data.len()),
            })),
            Some(Node::Dir { .. }) => Err(StoreError::NotADirectory { path }),
            None => Err(StoreError::NotFound { path }),
        }
    }

    fn open_write(&self, path: &str, overwrite: bool) -> StoreResult<Box<dyn ObjectWriter>> {
        let path = self.resolve(FaultOp::Write, path)?;
        if !overwrite && self.ns.lock().nodes.contains_key(&path) {
            return Err(StoreError::AlreadyExists { path });
        }
        Ok(Box::new(MemWriter {
            ns: Arc::clone(&self.ns),
            path,
            buf: Vec::new(),
        }))
    }

    fn concatenate(&self, target: &str, sources: &[String]) -> StoreResult<bool> {
        let target = self.resolve(FaultOp::Concatenate, target)?;
        let mut ns = self.ns.lock();

        let mut joined = Vec::new();
        for source in sources {
            let source = normalize_path(source);
            match ns.nodes.get(&source) {
                Some(Node::File { data, .. }) => joined.extend_from_slice(data),
                Some(Node::Dir { .. }) => return Err(StoreError::NotADirectory { path: source }),
                None => return Err(StoreError::NotFound { path: source }),
            }
        }
        for source in sources {
            ns.take_subtree(&normalize_path(source));
        }
        ns.put_file(&target, joined)?;
        Ok(true)
    }

    fn rename(&self, src: &str, dst: &str, overwrite: bool) -> StoreResult<bool> {
        let src = self.resolve(FaultOp::Rename, src)?;
        validate_path(dst)?;
        let dst = normalize_path(dst);
        let mut ns = self.ns.lock();

        if !ns.nodes.contains_key(&src) {
            return Err(StoreError::NotFound { path: src });
        }
        let dst_is_dir = ns.nodes.get(&dst).map(|n| matches!(n, Node::Dir { .. }));
        match dst_is_dir {
            None => {}
            Some(_) if !overwrite => return Ok(false),
            // Overwrite replaces files only, never a directory tree
            Some(true) => return Ok(false),
            Some(false) => {
                ns.take_subtree(&dst);
            }
        }
        if let Some(parent) = parent_path(&dst) {
            ns.ensure_dir(&parent)?;
        }

        let moved = ns.take_subtree(&src);
        for (key, node) in moved {
            let new_key = format!("{}{}", dst, &key[src.len()..]);
            ns.nodes.insert(new_key, node);
        }
        if let Some(parent) = parent_path(&dst) {
            ns.link(&parent, &dst);
        }
        Ok(true)
    }

    fn delete(&self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        let path = normalize_path(path);
        if path == "/" {
            return Err(StoreError::InvalidPath {
                path,
                reason: "cannot delete the root".into(),
            });
        }
        Ok(!self.ns.lock().take_subtree(&path).is_empty())
    }

    fn apply_acl(&self, path: &str, spec: &[AclEntry], mode: AclMode) -> StoreResult<()> {
        validate_path(path)?;
        let normalized = normalize_path(path);
        *self.acl_calls.lock().entry(normalized.clone()).or_insert(0) += 1;
        self.check_fault(FaultOp::ApplyAcl, &normalized)?;

        let mut ns = self.ns.lock();
        match ns.nodes.get_mut(&normalized) {
            Some(Node::File { acl, .. }) | Some(Node::Dir { acl, .. }) => {
                *acl = apply_acl_spec(acl, spec, mode);
                Ok(())
            }
            None => Err(StoreError::NotFound { path: normalized }),
        }
    }
}

struct MemReader {
    data: Arc<Vec<u8>>,
    pos: usize,
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

struct MemWriter {
    ns: Arc<Mutex<Namespace>>,
    path: String,
    buf: Vec<u8>,
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemWriter {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemWriter { ns, path, buf } = *self;
        let mut ns = ns.lock();
        ns.put_file(&path, buf)
    }
}
