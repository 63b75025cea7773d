//! Entry store implementation
//!
//! One flat directory, two files per entry, no index:
//! - `<key>.dmat` - decoder matrix blob, the authoritative half
//! - `<key>.meta` - solver info record (JSON), optional
//!
//! The directory listing is the source of truth. Every write goes through a
//! temp file in the same directory followed by a rename, so readers never
//! observe a half-written file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use ahash::RandomState;

use crate::blob;
use crate::error::{Error, Result};
use crate::info::SolverInfo;
use crate::key::CacheKey;
use crate::matrix::Matrix;

/// Extension of artifact (decoder matrix) files
pub const ARTIFACT_EXT: &str = "dmat";

/// Extension of metadata (solver info) files
pub const INFO_EXT: &str = "meta";

/// A cache entry read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The decoder matrix
    pub decoders: Matrix,
    /// The solver info record (empty when the info file was missing)
    pub info: SolverInfo,
    /// Whether the info file was actually present
    pub info_present: bool,
}

/// Listing record for one stored entry
#[derive(Debug, Clone)]
pub struct EntryStat {
    /// Key of the entry
    pub key: CacheKey,
    /// Last access time of the artifact file
    pub accessed: SystemTime,
    /// Bytes used by the entry's files
    pub bytes: u64,
}

/// Maps cache keys to two-file entries in a single directory
#[derive(Debug, Clone)]
pub struct DecoderStore {
    root: PathBuf,
}

impl DecoderStore {
    /// Open a store rooted at the given directory, creating it if missing
    ///
    /// # Arguments
    /// * `root` - Directory that holds the entry files
    ///
    /// # Returns
    /// * `Result<DecoderStore>` - Store handle
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        Ok(DecoderStore { root })
    }

    /// Directory that holds the entry files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact file for a key
    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, ARTIFACT_EXT))
    }

    /// Path of the metadata file for a key
    pub fn info_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, INFO_EXT))
    }

    /// Check whether an entry exists (the artifact file is authoritative)
    pub fn exists(&self, key: &CacheKey) -> bool {
        self.artifact_path(key).exists()
    }

    /// Read an entry
    ///
    /// Returns `Ok(None)` when the artifact file is absent, so a lookup that
    /// loses a race against eviction degrades to a miss instead of an error.
    /// A missing metadata file yields an empty record with
    /// `info_present = false`. Reading the artifact refreshes its access
    /// time, the timestamp [`entries`](DecoderStore::entries) reports.
    ///
    /// # Arguments
    /// * `key` - Entry key
    ///
    /// # Returns
    /// * `Result<Option<CacheEntry>>` - The entry, or `None` on a miss
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.artifact_path(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&path, e)),
        };
        let decoders = blob::decode_matrix(&bytes)?;

        let info_path = self.info_path(key);
        let (info, info_present) = match fs::read(&info_path) {
            Ok(bytes) => (SolverInfo::from_json(&bytes)?, true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (SolverInfo::new(), false),
            Err(e) => return Err(Error::io(&info_path, e)),
        };

        Ok(Some(CacheEntry {
            decoders,
            info,
            info_present,
        }))
    }

    /// Write an entry, replacing any previous one under the same key
    ///
    /// The artifact lands before the metadata, so a concurrent reader sees
    /// nothing, a complete artifact with no metadata yet, or the complete
    /// pair. Metadata is never present without its artifact.
    ///
    /// # Arguments
    /// * `key` - Entry key
    /// * `decoders` - Decoder matrix to store
    /// * `info` - Solver info record to store beside it
    pub fn put(&self, key: &CacheKey, decoders: &Matrix, info: &SolverInfo) -> Result<()> {
        self.write_atomic(&self.artifact_path(key), &blob::encode_matrix(decoders))?;
        self.write_atomic(&self.info_path(key), &info.to_json()?)?;
        Ok(())
    }

    /// Delete an entry; files that are already gone are ignored
    ///
    /// The metadata file goes first so an interrupted delete cannot strand
    /// metadata without its artifact.
    pub fn delete(&self, key: &CacheKey) -> Result<()> {
        remove_if_present(&self.info_path(key))?;
        remove_if_present(&self.artifact_path(key))?;
        Ok(())
    }

    /// List every artifact-bearing entry with access time and size
    ///
    /// Orphaned metadata, temp files, and foreign files are skipped. The
    /// reported size covers both of an entry's files. Order is unspecified.
    pub fn entries(&self) -> Result<Vec<EntryStat>> {
        let mut sizes: HashMap<CacheKey, u64, RandomState> = HashMap::default();
        let mut artifacts: Vec<(CacheKey, SystemTime)> = Vec::new();

        for dirent in fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))? {
            let dirent = dirent.map_err(|e| Error::io(&self.root, e))?;
            let path = dirent.path();
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s,
                None => continue,
            };
            let ext = match path.extension().and_then(|s| s.to_str()) {
                Some(e) => e,
                None => continue,
            };
            if ext != ARTIFACT_EXT && ext != INFO_EXT {
                continue;
            }
            let key = match CacheKey::parse(stem) {
                Ok(k) => k,
                Err(_) => continue,
            };
            // A file can vanish between listing and stat while another
            // process shrinks the same directory.
            let meta = match dirent.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            *sizes.entry(key.clone()).or_insert(0) += meta.len();
            if ext == ARTIFACT_EXT {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                artifacts.push((key, accessed));
            }
        }

        Ok(artifacts
            .into_iter()
            .map(|(key, accessed)| {
                let bytes = sizes.get(&key).copied().unwrap_or(0);
                EntryStat { key, accessed, bytes }
            })
            .collect())
    }

    /// Total bytes used by every file in the store directory
    ///
    /// Counts temp files and foreign files too: the number answers "how much
    /// disk does this directory occupy", not "how many bytes of entries".
    pub fn total_size(&self) -> Result<u64> {
        let mut size = 0;
        for dirent in fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))? {
            let dirent = dirent.map_err(|e| Error::io(&self.root, e))?;
            let meta = match dirent.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.is_file() {
                size += meta.len();
            }
        }
        Ok(size)
    }

    /// Remove every artifact and metadata file; foreign files stay
    ///
    /// # Returns
    /// * `Result<usize>` - Number of files removed
    pub fn remove_cache_files(&self) -> Result<usize> {
        let mut removed = 0;
        for dirent in fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))? {
            let dirent = dirent.map_err(|e| Error::io(&self.root, e))?;
            let path = dirent.path();
            let is_entry_file = matches!(
                path.extension().and_then(|s| s.to_str()),
                Some(ARTIFACT_EXT) | Some(INFO_EXT)
            );
            if is_entry_file {
                remove_if_present(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        // Concurrent writers must never share a temp path: the pid separates
        // processes, the counter separates threads within one.
        static SEQ: AtomicU64 = AtomicU64::new(0);

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry");
        let tmp = self.root.join(format!(
            ".{}.{}.{}.tmp",
            file_name,
            process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_file(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(&tmp, e));
        }
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::io(path, e)
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn test_key(n: u8) -> CacheKey {
        CacheKey::from_digest(&[n; 32])
    }

    fn test_matrix(scale: f64) -> Matrix {
        Matrix::from_vec(2, 2, vec![scale, 2.0 * scale, 3.0 * scale, 4.0 * scale])
    }

    #[test]
    fn test_open_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deep").join("nested");

        let store = DecoderStore::open(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(store.root(), root);
    }

    #[test]
    fn test_entry_paths() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(1);

        let artifact = store.artifact_path(&key);
        let info = store.info_path(&key);

        assert_eq!(
            artifact.file_name().unwrap().to_str().unwrap(),
            format!("{}.dmat", key)
        );
        assert_eq!(
            info.file_name().unwrap().to_str().unwrap(),
            format!("{}.meta", key)
        );
    }

    #[test]
    fn test_put_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(2);
        let decoders = test_matrix(1.0);
        let info = SolverInfo::new().with("rmse", 0.032).with("iterations", 17i64);

        store.put(&key, &decoders, &info).unwrap();
        let entry = store.get(&key).unwrap().unwrap();

        assert_eq!(entry.decoders, decoders);
        assert_eq!(entry.info, info);
        assert!(entry.info_present);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        assert!(store.get(&test_key(3)).unwrap().is_none());
    }

    #[test]
    fn test_exists() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(4);

        assert!(!store.exists(&key));
        store.put(&key, &test_matrix(1.0), &SolverInfo::new()).unwrap();
        assert!(store.exists(&key));
    }

    #[test]
    fn test_missing_info_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(5);
        let info = SolverInfo::new().with("rmse", 0.5);

        store.put(&key, &test_matrix(1.0), &info).unwrap();
        fs::remove_file(store.info_path(&key)).unwrap();
        let entry = store.get(&key).unwrap().unwrap();

        assert!(entry.info.is_empty());
        assert!(!entry.info_present);
    }

    #[test]
    fn test_delete_removes_both_files() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(6);

        store.put(&key, &test_matrix(1.0), &SolverInfo::new()).unwrap();
        store.delete(&key).unwrap();

        assert!(!store.exists(&key));
        assert!(!store.info_path(&key).exists());
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        store.delete(&test_key(7)).unwrap();
    }

    #[test]
    fn test_put_overwrites_same_key() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(8);

        store.put(&key, &test_matrix(1.0), &SolverInfo::new()).unwrap();
        let second = test_matrix(10.0);
        store.put(&key, &second, &SolverInfo::new().with("pass", 2i64)).unwrap();
        let entry = store.get(&key).unwrap().unwrap();

        assert_eq!(entry.decoders, second);
        assert_eq!(entry.info.get("pass"), Some(&crate::info::InfoValue::Int(2)));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_entries_lists_artifact_bearing() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        store.put(&test_key(1), &test_matrix(1.0), &SolverInfo::new()).unwrap();
        store.put(&test_key(2), &test_matrix(2.0), &SolverInfo::new()).unwrap();
        // Orphan a metadata file by removing its artifact.
        store.put(&test_key(3), &test_matrix(3.0), &SolverInfo::new()).unwrap();
        fs::remove_file(store.artifact_path(&test_key(3))).unwrap();

        let entries = store.entries().unwrap();

        assert_eq!(entries.len(), 2);
        let mut keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec![test_key(1), test_key(2)]);
        assert!(entries.iter().all(|e| e.bytes > 0));
    }

    #[test]
    fn test_entries_counts_both_files() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(9);

        store.put(&key, &test_matrix(1.0), &SolverInfo::new().with("x", 1i64)).unwrap();

        let artifact_len = fs::metadata(store.artifact_path(&key)).unwrap().len();
        let info_len = fs::metadata(store.info_path(&key)).unwrap().len();
        let entries = store.entries().unwrap();

        assert_eq!(entries[0].bytes, artifact_len + info_len);
    }

    #[test]
    fn test_entries_ignores_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        store.put(&test_key(1), &test_matrix(1.0), &SolverInfo::new()).unwrap();
        fs::write(tmp.path().join("README.txt"), b"not an entry").unwrap();
        fs::write(tmp.path().join("short.dmat"), b"bad stem").unwrap();

        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_total_size_counts_all_files() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        store.put(&test_key(1), &test_matrix(1.0), &SolverInfo::new()).unwrap();
        fs::write(tmp.path().join("stray.bin"), vec![0u8; 100]).unwrap();

        let mut expected = 100;
        expected += fs::metadata(store.artifact_path(&test_key(1))).unwrap().len();
        expected += fs::metadata(store.info_path(&test_key(1))).unwrap().len();

        assert_eq!(store.total_size().unwrap(), expected);
    }

    #[test]
    fn test_total_size_empty_store() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        assert_eq!(store.total_size().unwrap(), 0);
    }

    #[test]
    fn test_remove_cache_files() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        store.put(&test_key(1), &test_matrix(1.0), &SolverInfo::new()).unwrap();
        store.put(&test_key(2), &test_matrix(2.0), &SolverInfo::new()).unwrap();
        fs::write(tmp.path().join("keep.txt"), b"foreign").unwrap();

        let removed = store.remove_cache_files().unwrap();

        assert_eq!(removed, 4);
        assert!(store.entries().unwrap().is_empty());
        assert!(tmp.path().join("keep.txt").exists());
    }

    #[test]
    fn test_no_temp_files_left_after_put() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();

        store.put(&test_key(1), &test_matrix(1.0), &SolverInfo::new()).unwrap();

        for dirent in fs::read_dir(tmp.path()).unwrap() {
            let name = dirent.unwrap().file_name();
            assert!(!name.to_str().unwrap().contains(".tmp"));
        }
    }

    #[test]
    fn test_concurrent_puts_and_gets_same_key() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(11);
        let decoders = test_matrix(1.0);

        // Two writers race on one key while a reader polls it. Every put
        // must succeed and every successful read must decode completely.
        let mut workers = Vec::new();
        for _ in 0..2 {
            let store = store.clone();
            let key = key.clone();
            let decoders = decoders.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..400 {
                    store.put(&key, &decoders, &SolverInfo::new()).unwrap();
                }
            }));
        }
        {
            let store = store.clone();
            let key = key.clone();
            let decoders = decoders.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..400 {
                    if let Some(entry) = store.get(&key).unwrap() {
                        assert_eq!(entry.decoders, decoders);
                    }
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let entry = store.get(&key).unwrap().unwrap();
        assert_eq!(entry.decoders, decoders);
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_degenerate_diagnostics_survive_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(12);
        let info = SolverInfo::new().with("rmse", f64::NAN);

        store.put(&key, &test_matrix(1.0), &info).unwrap();
        let entry = store.get(&key).unwrap().unwrap();

        assert!(matches!(
            entry.info.get("rmse"),
            Some(crate::info::InfoValue::Float(v)) if v.is_nan()
        ));
    }

    #[test]
    fn test_get_rejects_corrupt_artifact() {
        let tmp = TempDir::new().unwrap();
        let store = DecoderStore::open(tmp.path()).unwrap();
        let key = test_key(10);

        fs::write(store.artifact_path(&key), b"garbage").unwrap();

        assert!(store.get(&key).is_err());
    }
}
