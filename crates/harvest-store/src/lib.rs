pub mod error;
pub mod paths;

pub use error::{Result, StoreError};
pub use paths::{HarvestPaths, TargetPaths};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File names longer than this are shortened and suffixed with a hash.
const MAX_SEGMENT_LEN: usize = 96;

/// Turn an arbitrary name (metric name, request id, host) into a single safe
/// path segment. A name that had to be rewritten or shortened gets a blake3
/// suffix of the original, so distinct inputs never share a segment.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = match cleaned.trim_matches('.') {
        "" => "_",
        kept => kept,
    };
    if cleaned == name && cleaned.len() <= MAX_SEGMENT_LEN {
        return cleaned.to_string();
    }
    let hash = blake3::hash(name.as_bytes()).to_hex();
    if cleaned.len() <= MAX_SEGMENT_LEN - 9 {
        format!("{cleaned}-{}", &hash[..8])
    } else {
        format!("{}-{}", &cleaned[..64], &hash[..16])
    }
}

/// Write `data` to `path` through a sibling temp file, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::NoParent(path.to_path_buf()))?;
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| StoreError::io(path, e))?;
    tmp.flush().map_err(|e| StoreError::io(path, e))?;
    tmp.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// File-based exclusive lock guard. Released on drop.
pub struct LockGuard {
    _file: fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Acquire an exclusive lock without waiting. A second run against the same
/// output directory gets `StoreError::Locked`.
pub fn lock_file(path: &Path) -> Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.try_lock_exclusive()
        .map_err(|_| StoreError::Locked(path.to_path_buf()))?;
    Ok(LockGuard {
        _file: file,
        path: path.to_path_buf(),
    })
}

// ── Storage seam ──

/// Artifact storage. Paths are absolute; every write is atomic.
pub trait Storage: Send + Sync {
    /// True when `path` holds a non-empty artifact.
    fn exists(&self, path: &Path) -> bool;

    fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()>;
}

/// Plain filesystem storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
    }

    fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()> {
        write_atomic(path, data)
    }
}

/// Read a JSON array artifact. A missing file reads as empty.
pub fn read_records<T: DeserializeOwned>(storage: &dyn Storage, path: &Path) -> Result<Vec<T>> {
    match storage.read_bytes(path)? {
        None => Ok(Vec::new()),
        Some(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::json(path, e)),
    }
}

/// Write records as a pretty JSON array.
pub fn write_records<T: Serialize>(storage: &dyn Storage, path: &Path, records: &[T]) -> Result<()> {
    let data = serde_json::to_vec_pretty(records).map_err(|e| StoreError::json(path, e))?;
    storage.write_bytes(path, &data)
}

/// Read any JSON document.
pub fn read_json<T: DeserializeOwned>(storage: &dyn Storage, path: &Path) -> Result<Option<T>> {
    match storage.read_bytes(path)? {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::json(path, e)),
    }
}

pub fn write_json<T: Serialize>(storage: &dyn Storage, path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
    storage.write_bytes(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: i64,
        name: String,
    }

    #[test]
    fn atomic_write_creates_missing_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/test.json");
        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn second_lock_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join(".lock");
        let guard = lock_file(&lock_path).unwrap();
        assert!(matches!(lock_file(&lock_path), Err(StoreError::Locked(_))));
        drop(guard);
        assert!(lock_file(&lock_path).is_ok());
    }

    #[test]
    fn empty_file_does_not_count_as_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.json");
        fs::write(&path, b"").unwrap();
        assert!(!FsStorage.exists(&path));
        assert!(!FsStorage.exists(&tmp.path().join("missing.json")));
        fs::write(&path, b"[]").unwrap();
        assert!(FsStorage.exists(&path));
    }

    #[test]
    fn records_round_trip_and_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rows.json");
        let missing: Vec<Row> = read_records(&FsStorage, &path).unwrap();
        assert!(missing.is_empty());

        let rows = vec![Row {
            id: 1,
            name: "Web".into(),
        }];
        write_records(&FsStorage, &path, &rows).unwrap();
        let back: Vec<Row> = read_records(&FsStorage, &path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn corrupt_json_is_reported_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let err = read_records::<Row>(&FsStorage, &path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn sanitize_keeps_safe_names_verbatim() {
        assert_eq!(sanitize_segment("abc-1"), "abc-1");
        assert_eq!(sanitize_segment("acme.example.com"), "acme.example.com");
        assert_eq!(sanitize_segment("ART"), "ART");
    }

    #[test]
    fn sanitize_rewritten_names_never_collide() {
        let slash = sanitize_segment("a/b");
        let underscore = sanitize_segment("a_b");
        assert_eq!(underscore, "a_b");
        assert!(slash.starts_with("a_b-"));
        assert_ne!(slash, underscore);

        let host = sanitize_segment("acme.example.com:8090");
        assert!(host.starts_with("acme.example.com_8090-"));
        assert_ne!(host, sanitize_segment("acme.example.com_8090"));

        for unsafe_name in ["../..", "", " x ", "Web|Individual Nodes"] {
            let s = sanitize_segment(unsafe_name);
            assert!(!s.contains('/') && !s.contains('|') && !s.contains(' '), "{s}");
            assert!(!s.starts_with('.'), "{s}");
        }
        assert_ne!(sanitize_segment("../.."), sanitize_segment(""));
    }

    #[test]
    fn sanitize_shortens_long_names_without_collisions() {
        let a = "x".repeat(200);
        let b = format!("{}y", "x".repeat(199));
        let sa = sanitize_segment(&a);
        let sb = sanitize_segment(&b);
        assert!(sa.len() <= MAX_SEGMENT_LEN);
        assert_ne!(sa, sb);
    }
}
