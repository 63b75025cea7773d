//! Decoder cache maintenance tool

mod backup;

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

use decocache::{CacheConfig, DecoderCache, SolverCache, DEFAULT_SHRINK_LIMIT};
use decostore::DecoderStore;

use crate::backup::CacheBackup;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and service a decoder cache directory", long_about = None)]
struct Args {
    /// Cache directory (defaults to the per-user cache location)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show entry count and disk usage
    Status,
    /// List entries, least recently used first
    List,
    /// Evict least-recently-used entries down to a limit
    Shrink {
        /// Number of entries to keep
        #[arg(short, long, default_value_t = DEFAULT_SHRINK_LIMIT)]
        limit: usize,
    },
    /// Remove every cached entry
    Invalidate {
        /// Skip the confirmation gate
        #[arg(long)]
        yes: bool,
    },
    /// Create, list, restore, or prune backup archives
    Backup {
        /// Directory holding archives (default: <cache>/backups)
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,

        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// Archive the cache directory to a timestamped .tar.gz
    Create {
        /// Name embedded in the archive filename
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List existing backup archives
    List,
    /// Merge entries from an archive back into the cache directory
    Restore {
        /// Archive produced by `backup create`
        archive: PathBuf,
    },
    /// Delete old archives, keeping the most recent ones
    Prune {
        /// Number of archives to keep
        #[arg(short, long, default_value_t = 5)]
        keep: usize,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let cache_dir = args.dir.unwrap_or_else(DecoderCache::default_dir);

    match args.command {
        Command::Status => status(&cache_dir),
        Command::List => list(&cache_dir),
        Command::Shrink { limit } => shrink(&cache_dir, limit),
        Command::Invalidate { yes } => invalidate(&cache_dir, yes),
        Command::Backup { backup_dir, action } => run_backup(&cache_dir, backup_dir, action),
    }
}

fn status(cache_dir: &Path) -> Result<()> {
    let store = DecoderStore::open(cache_dir)?;
    let entries = store.entries()?;
    let size = store.total_size()?;

    println!("Cache directory: {}", cache_dir.display());
    println!("Entries:         {}", entries.len());
    println!("Disk usage:      {} ({} bytes)", human_bytes(size), size);
    Ok(())
}

fn list(cache_dir: &Path) -> Result<()> {
    let store = DecoderStore::open(cache_dir)?;
    let mut entries = store.entries()?;
    entries.sort_by(|a, b| (a.accessed, &a.key).cmp(&(b.accessed, &b.key)));

    if entries.is_empty() {
        println!("No cached entries in {}", cache_dir.display());
        return Ok(());
    }

    println!("{:<19}  {:>10}  KEY", "LAST USED", "SIZE");
    for entry in &entries {
        let accessed: DateTime<Local> = entry.accessed.into();
        println!(
            "{}  {:>10}  {}",
            accessed.format("%Y-%m-%d %H:%M:%S"),
            human_bytes(entry.bytes),
            entry.key
        );
    }
    println!("\n{} entries", entries.len());
    Ok(())
}

fn shrink(cache_dir: &Path, limit: usize) -> Result<()> {
    let cache = DecoderCache::new(CacheConfig::new().cache_dir(cache_dir))?;
    let evicted = cache.shrink(limit)?;

    if evicted == 0 {
        println!("Nothing to evict (limit: {})", limit);
    } else {
        println!("Evicted {} entries (limit: {})", evicted, limit);
    }
    println!("Disk usage now: {}", human_bytes(cache.size()?));
    Ok(())
}

fn invalidate(cache_dir: &Path, yes: bool) -> Result<()> {
    if !yes {
        let store = DecoderStore::open(cache_dir)?;
        let count = store.entries()?.len();
        println!(
            "This removes all {} entries from {}; re-run with --yes to confirm",
            count,
            cache_dir.display()
        );
        return Ok(());
    }

    let cache = DecoderCache::new(CacheConfig::new().cache_dir(cache_dir))?;
    let removed = cache.invalidate()?;

    println!("Removed {} cache files from {}", removed, cache_dir.display());
    Ok(())
}

fn run_backup(cache_dir: &Path, backup_dir: Option<PathBuf>, action: BackupAction) -> Result<()> {
    let backup = CacheBackup::new(cache_dir, backup_dir);

    match action {
        BackupAction::Create { name } => {
            let path = backup.create_backup(name.as_deref())?;
            let size = std::fs::metadata(&path)?.len();
            println!("Created {} ({})", path.display(), human_bytes(size));
        }
        BackupAction::List => {
            let backups = backup.list_backups()?;
            if backups.is_empty() {
                println!("No backups in {}", backup.backup_dir.display());
                return Ok(());
            }
            println!("{:<19}  {:>10}  ARCHIVE", "CREATED", "SIZE");
            for info in &backups {
                let created = info
                    .modified
                    .map(|t| {
                        let dt: DateTime<Local> = t.into();
                        dt.format("%Y-%m-%d %H:%M:%S").to_string()
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{:<19}  {:>10}  {}", created, human_bytes(info.size), info.filename);
            }
        }
        BackupAction::Restore { archive } => {
            let restored = backup.restore_backup(&archive)?;
            println!(
                "Restored {} files from {} into {}",
                restored,
                archive.display(),
                cache_dir.display()
            );
        }
        BackupAction::Prune { keep } => {
            let deleted = backup.cleanup_old_backups(keep)?;
            println!("Deleted {} old backup(s), kept at most {}", deleted, keep);
        }
    }
    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
