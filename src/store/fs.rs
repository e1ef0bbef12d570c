//! Filesystem-backed store
//!
//! Maps store paths onto a directory tree below a root. Objects are written
//! to a temp file next to their destination and persisted on commit, so a
//! reader never sees a partially written object. ACLs are kept as JSON
//! sidecars under `<root>/.bulkstore/acl/`, which is hidden from listings.

use super::acl::{apply_acl_spec, AclEntry, AclMode};
use super::types::{join_path, normalize_path, DirectoryEntry, ListPage};
use super::{validate_path, ByteSource, ObjectWriter, RemoteStore};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Metadata directory below the store root
const META_DIR: &str = ".bulkstore";

/// Store rooted at a local directory
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    acl_lock: Mutex<()>,
}

impl FsStore {
    /// Open a store rooted at `root`, which must be an existing directory
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        let label = root.display().to_string();
        let meta = fs::metadata(root).map_err(|e| StoreError::io(&label, &e))?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory { path: label });
        }
        let root = fs::canonicalize(root).map_err(|e| StoreError::io(&label, &e))?;
        debug!(root = %root.display(), "Opened filesystem store");
        Ok(Self {
            root,
            acl_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store path to a filesystem path under the root
    fn resolve(&self, path: &str) -> StoreResult<(String, PathBuf)> {
        validate_path(path)?;
        let normalized = normalize_path(path);
        let rel = normalized.trim_start_matches('/');
        if rel.split('/').next() == Some(META_DIR) {
            return Err(StoreError::InvalidPath {
                path: normalized,
                reason: "reserved metadata path".into(),
            });
        }
        let local = if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        };
        Ok((normalized, local))
    }

    fn acl_sidecar(&self, normalized: &str) -> PathBuf {
        let rel = normalized.trim_start_matches('/');
        let base = self.root.join(META_DIR).join("acl");
        if rel.is_empty() {
            base.join(".root.json")
        } else {
            base.join(format!("{}.json", rel))
        }
    }

    fn read_acl(&self, normalized: &str) -> StoreResult<Vec<AclEntry>> {
        let sidecar = self.acl_sidecar(normalized);
        match fs::read(&sidecar) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Io {
                path: normalized.to_string(),
                reason: format!("corrupt ACL sidecar: {}", e),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::io(normalized, &e)),
        }
    }

    /// Current ACL of an entry (empty if none was ever applied)
    pub fn acl(&self, path: &str) -> StoreResult<Vec<AclEntry>> {
        let (normalized, local) = self.resolve(path)?;
        fs::symlink_metadata(&local).map_err(|e| StoreError::io(&normalized, &e))?;
        self.read_acl(&normalized)
    }

    fn entry_for(normalized: &str, meta: &fs::Metadata) -> DirectoryEntry {
        if meta.is_dir() {
            DirectoryEntry::directory(normalized)
        } else {
            DirectoryEntry::file(normalized, meta.len())
        }
    }

    fn ensure_parent(normalized: &str, local: &Path) -> StoreResult<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(normalized, &e))?;
        }
        Ok(())
    }
}

impl RemoteStore for FsStore {
    fn get_entry(&self, path: &str) -> StoreResult<DirectoryEntry> {
        let (normalized, local) = self.resolve(path)?;
        let meta = fs::metadata(&local).map_err(|e| StoreError::io(&normalized, &e))?;
        Ok(Self::entry_for(&normalized, &meta))
    }

    fn list_children(
        &self,
        path: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        let (normalized, local) = self.resolve(path)?;
        let meta = fs::metadata(&local).map_err(|e| StoreError::io(&normalized, &e))?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory { path: normalized });
        }

        let is_root = normalized == "/";
        let mut names = Vec::new();
        for dirent in fs::read_dir(&local).map_err(|e| StoreError::io(&normalized, &e))? {
            let dirent = dirent.map_err(|e| StoreError::io(&normalized, &e))?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if is_root && name == META_DIR {
                continue;
            }
            names.push(name);
        }
        names.sort_unstable();

        let page_size = page_size.max(1);
        let mut entries = Vec::with_capacity(page_size.min(names.len()));
        for name in names
            .into_iter()
            .filter(|n| continuation.map_or(true, |token| n.as_str() > token))
        {
            if entries.len() == page_size {
                break;
            }
            let child = join_path(&normalized, &name);
            match fs::metadata(local.join(&name)) {
                Ok(meta) => entries.push(Self::entry_for(&child, &meta)),
                // Vanished between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&child, &e)),
            }
        }

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
        let (normalized, local) = self.resolve(path)?;
        match fs::metadata(&local) {
            Ok(meta) => return Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&normalized, &e)),
        }
        fs::create_dir_all(&local).map_err(|e| StoreError::io(&normalized, &e))?;
        Ok(true)
    }

    fn open_read(&self, path: &str, offset: u64) -> StoreResult<ByteSource> {
        let (normalized, local) = self.resolve(path)?;
        let mut file = File::open(&local).map_err(|e| StoreError::io(&normalized, &e))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| StoreError::io(&normalized, &e))?;
        }
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &str, overwrite: bool) -> StoreResult<Box<dyn ObjectWriter>> {
        let (normalized, local) = self.resolve(path)?;
        if !overwrite && local.exists() {
            return Err(StoreError::AlreadyExists { path: normalized });
        }
        Self::ensure_parent(&normalized, &local)?;
        let dir = local.parent().unwrap_or(&self.root);
        let tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(&normalized, &e))?;
        Ok(Box::new(FsWriter {
            tmp,
            target: local,
            path: normalized,
            overwrite,
        }))
    }

    fn concatenate(&self, target: &str, sources: &[String]) -> StoreResult<bool> {
        let (normalized, local) = self.resolve(target)?;
        Self::ensure_parent(&normalized, &local)?;
        let dir = local.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(&normalized, &e))?;

        let mut resolved = Vec::with_capacity(sources.len());
        for source in sources {
            let (src_norm, src_local) = self.resolve(source)?;
            let mut file = File::open(&src_local).map_err(|e| StoreError::io(&src_norm, &e))?;
            io::copy(&mut file, &mut tmp).map_err(|e| StoreError::io(&normalized, &e))?;
            resolved.push((src_norm, src_local));
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&normalized, &e))?;
        tmp.persist(&local)
            .map_err(|e| StoreError::io(&normalized, &e.error))?;

        for (src_norm, src_local) in resolved {
            if let Err(e) = fs::remove_file(&src_local) {
                warn!(path = %src_norm, error = %e, "Failed to remove concatenated source");
            }
        }
        Ok(true)
    }

    fn rename(&self, src: &str, dst: &str, overwrite: bool) -> StoreResult<bool> {
        let (src_norm, src_local) = self.resolve(src)?;
        let (dst_norm, dst_local) = self.resolve(dst)?;
        fs::symlink_metadata(&src_local).map_err(|e| StoreError::io(&src_norm, &e))?;

        match fs::metadata(&dst_local) {
            Ok(meta) => {
                if !overwrite {
                    return Ok(false);
                }
                // Overwrite replaces files only, never a directory tree
                if meta.is_dir() {
                    warn!(path = %dst_norm, "Refusing to replace a directory");
                    return Ok(false);
                }
                fs::remove_file(&dst_local).map_err(|e| StoreError::io(&dst_norm, &e))?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&dst_norm, &e)),
        }

        Self::ensure_parent(&dst_norm, &dst_local)?;
        fs::rename(&src_local, &dst_local).map_err(|e| StoreError::io(&dst_norm, &e))?;
        Ok(true)
    }

    fn delete(&self, path: &str) -> StoreResult<bool> {
        let (normalized, local) = self.resolve(path)?;
        if normalized == "/" {
            return Err(StoreError::InvalidPath {
                path: normalized,
                reason: "cannot delete the root".into(),
            });
        }
        let meta = match fs::symlink_metadata(&local) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StoreError::io(&normalized, &e)),
        };
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&local)
        } else {
            fs::remove_file(&local)
        };
        removed.map_err(|e| StoreError::io(&normalized, &e))?;

        let sidecar = self.acl_sidecar(&normalized);
        let _ = fs::remove_file(&sidecar);
        Ok(true)
    }

    fn apply_acl(&self, path: &str, spec: &[AclEntry], mode: AclMode) -> StoreResult<()> {
        let (normalized, local) = self.resolve(path)?;
        let _guard = self.acl_lock.lock();

        fs::symlink_metadata(&local).map_err(|e| StoreError::io(&normalized, &e))?;
        let current = self.read_acl(&normalized)?;
        let updated = apply_acl_spec(&current, spec, mode);

        let sidecar = self.acl_sidecar(&normalized);
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(&normalized, &e))?;
        }
        let json = serde_json::to_vec_pretty(&updated).map_err(|e| StoreError::Io {
            path: normalized.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&sidecar, json).map_err(|e| StoreError::io(&normalized, &e))?;
        Ok(())
    }
}

struct FsWriter {
    tmp: NamedTempFile,
    target: PathBuf,
    path: String,
    overwrite: bool,
}

impl Write for FsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

impl ObjectWriter for FsWriter {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        let FsWriter {
            mut tmp,
            target,
            path,
            overwrite,
        } = *self;
        tmp.flush().map_err(|e| StoreError::io(&path, &e))?;
        let persisted = if overwrite {
            tmp.persist(&target)
        } else {
            tmp.persist_noclobber(&target)
        };
        match persisted {
            Ok(_) => Ok(()),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists { path })
            }
            Err(e) => Err(StoreError::io(&path, &e.error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::acl::parse_acl_spec;
    use std::io::Read;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn write(store: &FsStore, path: &str, data: &[u8]) {
        let mut w = store.open_write(path, true).unwrap();
        w.write_all(data).unwrap();
        w.commit().unwrap();
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FsStore::open(dir.path().join("missing")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = store();
        write(&store, "/a/b/obj.bin", b"abcdefgh");

        let entry = store.get_entry("/a/b/obj.bin").unwrap();
        assert_eq!(entry.length, 8);

        let mut r = store.open_read("/a/b/obj.bin", 5).unwrap();
        let mut tail = Vec::new();
        r.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, b"fgh");
    }

    #[test]
    fn test_no_clobber() {
        let (_dir, store) = store();
        write(&store, "/x", b"1");
        assert!(matches!(
            store.open_write("/x", false),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_listing_hides_metadata_and_pages() {
        let (_dir, store) = store();
        for name in ["c", "a", "b"] {
            write(&store, &format!("/{}", name), b"");
        }
        store
            .apply_acl("/a", &parse_acl_spec("user:bob:r--").unwrap(), AclMode::Modify)
            .unwrap();

        let page = store.list_children("/", 2, None).unwrap();
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(page.continuation.as_deref(), Some("b"));

        let rest = store.list_children("/", 2, Some("b")).unwrap();
        assert_eq!(rest.entries.len(), 1);
        assert!(rest.continuation.is_none());
    }

    #[test]
    fn test_metadata_path_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get_entry("/.bulkstore/acl"),
            Err(StoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_concatenate_and_rename() {
        let (_dir, store) = store();
        write(&store, "/d/f-seg/f-0", b"hello ");
        write(&store, "/d/f-seg/f-1", b"world");

        let sources = vec!["/d/f-seg/f-0".to_string(), "/d/f-seg/f-1".to_string()];
        assert!(store.concatenate("/d/tmp", &sources).unwrap());
        assert!(store.get_entry("/d/f-seg/f-0").unwrap_err().is_not_found());

        assert!(store.rename("/d/tmp", "/d/f", true).unwrap());
        assert_eq!(store.get_entry("/d/f").unwrap().length, 11);
        assert!(store.delete("/d/f-seg").unwrap());
        assert!(!store.delete("/d/f-seg").unwrap());
    }

    #[test]
    fn test_rename_overwrite_keeps_directory() {
        let (dir, store) = store();
        write(&store, "/tmp-obj", b"new");
        write(&store, "/d/f.bin/precious/keep.txt", b"k");

        assert!(!store.rename("/tmp-obj", "/d/f.bin", true).unwrap());
        assert_eq!(fs::read(dir.path().join("d/f.bin/precious/keep.txt")).unwrap(), b"k");
        assert_eq!(store.get_entry("/tmp-obj").unwrap().length, 3);
    }

    #[test]
    fn test_acl_sidecar() {
        let (_dir, store) = store();
        store.create_directory("/dir").unwrap();
        let spec = parse_acl_spec("user:alice:rwx,default:user:alice:r-x").unwrap();

        store.apply_acl("/dir", &spec, AclMode::Modify).unwrap();
        assert_eq!(store.acl("/dir").unwrap(), spec);

        store
            .apply_acl("/dir", &parse_acl_spec("user:alice").unwrap(), AclMode::Remove)
            .unwrap();
        assert_eq!(store.acl("/dir").unwrap().len(), 1);

        assert!(store
            .apply_acl("/nope", &spec, AclMode::Modify)
            .unwrap_err()
            .is_not_found());
    }
}
