//! Cache diagnostics
//!
//! Recoverable anomalies are reported through an injectable sink instead of
//! being logged directly, so embedding applications can collect them and
//! tests can assert on them.

use parking_lot::Mutex;

use decostore::CacheKey;

/// A recoverable cache anomaly
#[derive(Debug, Clone, PartialEq)]
pub enum CacheWarning {
    /// An entry's artifact was readable but its solver info file was
    /// missing; an empty record was substituted
    MissingSolverInfo {
        /// Key of the degraded entry
        key: CacheKey,
    },
}

/// Receives cache warnings
pub trait DiagnosticSink: Send + Sync {
    /// Deliver one warning
    fn warn(&self, warning: CacheWarning);
}

/// Default sink: forwards warnings to `tracing::warn!`
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, warning: CacheWarning) {
        match warning {
            CacheWarning::MissingSolverInfo { key } => tracing::warn!(
                %key,
                "loaded cached decoders but found no solver info; it will be empty"
            ),
        }
    }
}

/// Sink that keeps warnings in memory for later inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    warnings: Mutex<Vec<CacheWarning>>,
}

impl MemorySink {
    /// New empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every warning delivered so far, leaving the sink empty
    pub fn drain(&self) -> Vec<CacheWarning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    /// Number of warnings delivered so far
    pub fn len(&self) -> usize {
        self.warnings.lock().len()
    }

    /// True when nothing was delivered
    pub fn is_empty(&self) -> bool {
        self.warnings.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn warn(&self, warning: CacheWarning) {
        self.warnings.lock().push(warning);
    }
}
