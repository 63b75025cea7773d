//! Cache directory archival
//!
//! Timestamped `.tar.gz` snapshots of a cache directory, for moving a warmed
//! cache between machines or keeping expensive solves around past an
//! invalidate. Keys are content-derived, so restoring merges: a restored
//! file either fills a hole or replaces byte-identical data.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::info;

use decostore::{CacheKey, ARTIFACT_EXT, INFO_EXT};

/// Filename prefix of archives produced by [`CacheBackup::create_backup`]
const ARCHIVE_PREFIX: &str = "decocache_";

/// Creates and restores archives of one cache directory
pub struct CacheBackup {
    /// Directory holding the cache entry files
    pub cache_dir: PathBuf,
    /// Directory the archives live in
    pub backup_dir: PathBuf,
}

impl CacheBackup {
    /// Archives land in `backup_dir`, or `<cache_dir>/backups` when `None`
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(cache_dir: P1, backup_dir: Option<P2>) -> Self {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let backup_dir = backup_dir
            .map(|p| p.as_ref().to_path_buf())
            .unwrap_or_else(|| cache_dir.join("backups"));

        Self {
            cache_dir,
            backup_dir,
        }
    }

    /// Snapshot the cache entries into a timestamped archive
    ///
    /// Only files that look like entries (a valid key stem with one of the
    /// two entry extensions) are archived; temp files, foreign files, and
    /// the backup directory itself never end up in an archive.
    ///
    /// # Arguments
    /// * `name` - Label embedded in the archive filename
    ///
    /// # Returns
    /// * `Result<PathBuf>` - Path of the created archive
    pub fn create_backup(&self, name: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir).context("creating backup directory")?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let label = name.unwrap_or("backup");
        let archive_path = self
            .backup_dir
            .join(format!("{}{}_{}.tar.gz", ARCHIVE_PREFIX, label, stamp));

        let file = File::create(&archive_path)
            .with_context(|| format!("creating {}", archive_path.display()))?;
        let mut tar = Builder::new(GzEncoder::new(file, Compression::default()));

        let names = entry_file_names(&self.cache_dir)?;
        for name in &names {
            let path = self.cache_dir.join(name);
            let mut entry_file =
                File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            tar.append_file(Path::new(name), &mut entry_file)
                .with_context(|| format!("archiving {}", name))?;
        }
        tar.into_inner()
            .context("finalizing archive")?
            .finish()
            .context("flushing archive")?;

        info!(
            archive = %archive_path.display(),
            files = names.len(),
            "cache backup created"
        );
        Ok(archive_path)
    }

    /// Merge the entries of an archive back into the cache directory
    ///
    /// The archive is extracted into a scratch directory first, then entry
    /// files move into place by rename. Artifacts land before metadata, and
    /// a metadata file whose artifact is nowhere to be found is dropped, so
    /// the restored directory never holds metadata without its artifact.
    /// Entries already present keep working throughout; anything in the
    /// archive that is not an entry file is ignored.
    ///
    /// # Arguments
    /// * `archive` - Archive produced by [`CacheBackup::create_backup`]
    ///
    /// # Returns
    /// * `Result<usize>` - Number of files restored
    pub fn restore_backup<P: AsRef<Path>>(&self, archive: P) -> Result<usize> {
        let archive = archive.as_ref();
        if !archive.is_file() {
            bail!("backup archive not found: {}", archive.display());
        }

        fs::create_dir_all(&self.cache_dir).context("creating cache directory")?;
        let scratch = self.cache_dir.join(".restore");
        if scratch.exists() {
            fs::remove_dir_all(&scratch).context("clearing stale restore scratch")?;
        }
        fs::create_dir_all(&scratch).context("creating restore scratch")?;

        let file = File::open(archive)
            .with_context(|| format!("opening {}", archive.display()))?;
        Archive::new(GzDecoder::new(file))
            .unpack(&scratch)
            .context("extracting backup archive")?;

        let names = entry_file_names(&scratch)?;
        let mut restored = 0;

        for name in names.iter().filter(|n| n.ends_with(ARTIFACT_EXT)) {
            fs::rename(scratch.join(name), self.cache_dir.join(name))
                .with_context(|| format!("restoring {}", name))?;
            restored += 1;
        }
        for name in names.iter().filter(|n| n.ends_with(INFO_EXT)) {
            let stem = match name.rsplit_once('.') {
                Some((stem, _)) => stem,
                None => continue,
            };
            let artifact = self.cache_dir.join(format!("{}.{}", stem, ARTIFACT_EXT));
            if !artifact.is_file() {
                continue;
            }
            fs::rename(scratch.join(name), self.cache_dir.join(name))
                .with_context(|| format!("restoring {}", name))?;
            restored += 1;
        }

        fs::remove_dir_all(&scratch).context("removing restore scratch")?;

        info!(
            archive = %archive.display(),
            files = restored,
            "cache backup restored"
        );
        Ok(restored)
    }

    /// List archives in the backup directory, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir).context("reading backup directory")? {
            let entry = entry.context("reading backup directory entry")?;
            let path = entry.path();
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if !path.is_file()
                || !filename.starts_with(ARCHIVE_PREFIX)
                || !filename.ends_with(".tar.gz")
            {
                continue;
            }
            let metadata = entry.metadata().context("reading archive metadata")?;
            backups.push(BackupInfo {
                path,
                filename,
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }

        backups.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(backups)
    }

    /// Delete all but the `keep` newest archives
    ///
    /// # Returns
    /// * `Result<usize>` - Number of archives deleted
    pub fn cleanup_old_backups(&self, keep: usize) -> Result<usize> {
        let backups = self.list_backups()?;
        let stale = backups.get(keep..).unwrap_or(&[]);

        for backup in stale {
            fs::remove_file(&backup.path)
                .with_context(|| format!("deleting {}", backup.path.display()))?;
            info!(archive = %backup.filename, "old backup deleted");
        }
        Ok(stale.len())
    }
}

/// One archive in the backup directory
#[derive(Debug)]
pub struct BackupInfo {
    /// Full path of the archive
    pub path: PathBuf,
    /// Archive filename
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time, where the filesystem reports one
    pub modified: Option<SystemTime>,
}

/// Sorted names of the cache entry files directly inside a directory
fn entry_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?
    {
        let entry = entry.context("reading directory entry")?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if is_entry_file(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// True for `<key>.dmat` and `<key>.meta` filenames
fn is_entry_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            (ext == ARTIFACT_EXT || ext == INFO_EXT) && CacheKey::parse(stem).is_ok()
        }
        None => false,
    }
}
