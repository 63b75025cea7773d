//! Cache effectiveness counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how a cache handle has been used.
///
/// One instance is shared between a cache handle and every solver it wraps.
/// A hit means a stored result was served and the solve was skipped; a miss
/// means the solver ran. On a read-write handle each successful miss is
/// persisted and counted as a write, so `writes` never exceeds `misses`;
/// the gap is misses whose result was discarded (read-only mode) or whose
/// solve failed. Evictions count entries removed by `shrink`.
///
/// Counters only ever count; nothing in the cache reads them back.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// New tracker with every counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a lookup served from disk
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a lookup that fell through to the solver
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a freshly solved result persisted to disk
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an entry deleted by `shrink`
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups served from disk
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that ran the solver
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Solved results persisted to disk
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Entries deleted by `shrink`
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from disk, 0.0 before any lookup
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        match hits + self.misses() {
            0 => 0.0,
            total => hits as f64 / total as f64,
        }
    }

    /// Zero every counter
    ///
    /// Counters are cleared one at a time; an event recorded concurrently
    /// may land on either side of the reset.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}
