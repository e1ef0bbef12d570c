//! Directory entry types returned by store listings

/// Kind of store entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

impl EntryKind {
    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == EntryKind::File
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Directory
    }
}

/// Snapshot of a store entry taken at listing time
///
/// The entry may be stale by the time it is acted on; callers must tolerate
/// `NotFound` for entries that vanished after they were listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Full `/`-separated path within the store
    pub full_path: String,

    /// Last path component
    pub name: String,

    /// File or directory
    pub kind: EntryKind,

    /// Length in bytes (0 for directories)
    pub length: u64,
}

impl DirectoryEntry {
    /// Create a file entry
    pub fn file(full_path: impl Into<String>, length: u64) -> Self {
        let full_path = full_path.into();
        Self {
            name: file_name(&full_path).to_string(),
            full_path,
            kind: EntryKind::File,
            length,
        }
    }

    /// Create a directory entry
    pub fn directory(full_path: impl Into<String>) -> Self {
        let full_path = full_path.into();
        Self {
            name: file_name(&full_path).to_string(),
            full_path,
            kind: EntryKind::Directory,
            length: 0,
        }
    }
}

/// One page of a directory listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries on this page, sorted by name
    pub entries: Vec<DirectoryEntry>,

    /// Cursor to resume after this page; `None` at end of listing
    pub continuation: Option<String>,
}

/// Join a store directory path and a child name
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if name.is_empty() {
        if dir.is_empty() {
            "/".to_string()
        } else {
            dir.to_string()
        }
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Last component of a store path ("" for the root)
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Normalize a store path: leading slash, no trailing or repeated slashes
pub fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

/// Parent directory of a normalized store path (`None` for the root)
pub fn parent_path(path: &str) -> Option<String> {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return None;
    }
    match normalized.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/data", "a.txt"), "/data/a.txt");
        assert_eq!(join_path("/data///", "a.txt"), "/data/a.txt");
        assert_eq!(join_path("/", "a.txt"), "/a.txt");
        assert_eq!(join_path("/data", ""), "/data");
        assert_eq!(join_path("/", ""), "/");
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("/data/a.txt"), "a.txt");
        assert_eq!(file_name("/data/dir/"), "dir");
        assert_eq!(file_name("/"), "");
        assert_eq!(parent_path("/data/a.txt").as_deref(), Some("/data"));
        assert_eq!(parent_path("/data").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("data//x/"), "/data/x");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_entry_constructors() {
        let f = DirectoryEntry::file("/a/b.bin", 42);
        assert_eq!(f.name, "b.bin");
        assert!(f.kind.is_file());
        assert_eq!(f.length, 42);

        let d = DirectoryEntry::directory("/a/sub");
        assert_eq!(d.name, "sub");
        assert!(d.kind.is_dir());
    }
}
