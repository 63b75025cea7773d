//! Solver cache: disk-backed and null variants

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use decostore::{DecoderStore, EntryStat, Matrix};

use crate::diag::{CacheWarning, DiagnosticSink, TracingSink};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::rng::SolverRng;
use crate::solver::{Solution, Solver, SolverDefaults};
use crate::stats::CacheStats;

/// Number of entries `shrink` keeps when no other limit is given
pub const DEFAULT_SHRINK_LIMIT: usize = 100;

/// Construction-time configuration for [`DecoderCache`]
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Serve hits but never write new entries
    pub read_only: bool,
    /// Cache directory; [`DecoderCache::default_dir`] when `None`
    pub cache_dir: Option<PathBuf>,
}

impl CacheConfig {
    /// Default configuration: read-write, default directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle read-only mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Use an explicit cache directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// One polymorphic handle for both cache variants.
///
/// Callers pick a variant once at construction, wrap their solvers, and
/// never branch on whether caching is enabled again.
pub trait SolverCache: Send + Sync {
    /// Wrap a solver with lookup-or-compute-and-store semantics
    fn wrap_solver(&self, solver: Arc<dyn Solver>) -> CachedSolver;

    /// Total bytes used by every file in the cache directory
    fn size(&self) -> Result<u64>;

    /// Evict least-recently-used entries until at most `limit` remain
    ///
    /// # Arguments
    /// * `limit` - Number of entries to keep
    ///
    /// # Returns
    /// * `Result<usize>` - Number of entries evicted
    fn shrink(&self, limit: usize) -> Result<usize>;

    /// Remove every cached entry
    ///
    /// # Returns
    /// * `Result<usize>` - Number of files removed
    fn invalidate(&self) -> Result<usize>;
}

/// Disk-backed cache for decoder solver results
pub struct DecoderCache {
    /// Underlying two-file-per-entry store
    store: Arc<DecoderStore>,

    /// Hit/miss/write/eviction counters
    stats: Arc<CacheStats>,

    /// Receiver for recoverable anomalies
    sink: Arc<dyn DiagnosticSink>,

    /// Serve hits but never write
    read_only: bool,
}

impl DecoderCache {
    /// Open a cache with the given configuration
    ///
    /// # Arguments
    /// * `config` - Read-only flag and cache directory
    ///
    /// # Returns
    /// * `Result<DecoderCache>` - Cache handle; the directory is created if
    ///   missing
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Open a cache that reports warnings to the given sink
    pub fn with_sink(config: CacheConfig, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        let dir = config.cache_dir.unwrap_or_else(Self::default_dir);
        let store = DecoderStore::open(&dir)?;
        debug!(
            dir = %store.root().display(),
            read_only = config.read_only,
            "decoder cache opened"
        );

        Ok(DecoderCache {
            store: Arc::new(store),
            stats: Arc::new(CacheStats::new()),
            sink,
            read_only: config.read_only,
        })
    }

    /// Default location: `decocache/decoders` under the platform per-user
    /// cache directory, or under the temp directory when none exists
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("decocache")
            .join("decoders")
    }

    /// Directory holding the entry files
    pub fn cache_dir(&self) -> &Path {
        self.store.root()
    }

    /// Whether this handle writes new entries
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl SolverCache for DecoderCache {
    fn wrap_solver(&self, solver: Arc<dyn Solver>) -> CachedSolver {
        CachedSolver {
            solver,
            backend: Some(CacheBackend {
                store: Arc::clone(&self.store),
                stats: Arc::clone(&self.stats),
                sink: Arc::clone(&self.sink),
                read_only: self.read_only,
            }),
        }
    }

    fn size(&self) -> Result<u64> {
        Ok(self.store.total_size()?)
    }

    fn shrink(&self, limit: usize) -> Result<usize> {
        let mut entries = self.store.entries()?;
        if entries.len() <= limit {
            return Ok(0);
        }

        sort_for_eviction(&mut entries);
        let excess = entries.len() - limit;
        for stat in &entries[..excess] {
            self.store.delete(&stat.key)?;
            self.stats.record_eviction();
        }
        debug!(evicted = excess, limit, "cache shrunk");

        Ok(excess)
    }

    fn invalidate(&self) -> Result<usize> {
        let removed = self.store.remove_cache_files()?;
        debug!(removed, "cache invalidated");
        Ok(removed)
    }
}

/// Eviction order: access time ascending, then key, so independent
/// shrinkers of the same directory delete the same entries.
fn sort_for_eviction(entries: &mut [EntryStat]) {
    entries.sort_by(|a, b| (a.accessed, &a.key).cmp(&(b.accessed, &b.key)));
}

/// No-op cache used when caching is disabled.
///
/// Wrapping hands the solver back as a plain pass-through and maintenance
/// does nothing, so callers can hold one [`SolverCache`] handle either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl NullCache {
    /// New no-op cache
    pub fn new() -> Self {
        NullCache
    }
}

impl SolverCache for NullCache {
    fn wrap_solver(&self, solver: Arc<dyn Solver>) -> CachedSolver {
        CachedSolver {
            solver,
            backend: None,
        }
    }

    fn size(&self) -> Result<u64> {
        Ok(0)
    }

    fn shrink(&self, _limit: usize) -> Result<usize> {
        Ok(0)
    }

    fn invalidate(&self) -> Result<usize> {
        Ok(0)
    }
}

struct CacheBackend {
    store: Arc<DecoderStore>,
    stats: Arc<CacheStats>,
    sink: Arc<dyn DiagnosticSink>,
    read_only: bool,
}

/// A solver wrapped with caching.
///
/// Obtained from [`SolverCache::wrap_solver`]. Referentially equivalent to
/// calling the solver directly, apart from latency and files on disk.
pub struct CachedSolver {
    solver: Arc<dyn Solver>,
    backend: Option<CacheBackend>,
}

impl CachedSolver {
    /// Solve with caching
    ///
    /// Resolves an omitted `rng` or `e` from the solver's declared
    /// defaults, derives the cache key from the resolved inputs, then loads
    /// a stored result or computes and (unless read-only) stores a fresh
    /// one.
    ///
    /// # Arguments
    /// * `activities` - Sampled activity matrix
    /// * `targets` - Target values to decode
    /// * `rng` - Generator; the solver's default stream when `None`
    /// * `e` - Optional weight matrix; the solver's default when `None`
    ///
    /// # Returns
    /// * `Result<Solution>` - Cached or freshly computed solution
    pub fn call(
        &self,
        activities: &Matrix,
        targets: &Matrix,
        rng: Option<&mut SolverRng>,
        e: Option<&Matrix>,
    ) -> Result<Solution> {
        // Resolve optional arguments the way the bare solver would.
        let SolverDefaults { rng: default_rng, e: default_e } = self.solver.defaults();
        let mut owned_rng;
        let rng = match rng {
            Some(r) => r,
            None => {
                owned_rng = default_rng;
                &mut owned_rng
            }
        };
        let e = match e {
            Some(m) => Some(m),
            None => default_e.as_ref(),
        };

        let backend = match &self.backend {
            Some(b) => b,
            None => return self.solver.solve(activities, targets, rng, e),
        };

        let key = fingerprint(&self.solver.identity(), activities, targets, &rng.state(), e);

        // Try the store first.
        if let Some(entry) = backend.store.get(&key)? {
            backend.stats.record_hit();
            debug!(%key, "cache hit, loading stored decoders");
            if !entry.info_present {
                backend.sink.warn(CacheWarning::MissingSolverInfo { key });
            }
            return Ok(Solution {
                decoders: entry.decoders,
                info: entry.info,
            });
        }

        // Miss: compute, then store unless read-only.
        backend.stats.record_miss();
        debug!(%key, "cache miss, running solver");
        let solution = self.solver.solve(activities, targets, rng, e)?;
        if !backend.read_only {
            backend.store.put(&key, &solution.decoders, &solution.info)?;
            backend.stats.record_write();
        }

        Ok(solution)
    }
}
