//! # decocache
//!
//! Disk cache for deterministic decoder solvers.
//!
//! ## Architecture
//! - **Fingerprinting**: SHA-256 over solver identity, inputs, and the
//!   exact generator state
//! - **Entry store**: two files per key via `decostore`, atomic writes
//! - **Adapter**: wrap a solver once, call it as before; hits skip the
//!   solve entirely
//! - **Variants**: `DecoderCache` on disk, `NullCache` when caching is
//!   off, one `SolverCache` trait over both

#![warn(missing_docs)]

mod rng;
mod solver;
mod fingerprint;
mod stats;
mod diag;
mod cache;
mod error;

pub use cache::{
    CacheConfig, CachedSolver, DecoderCache, NullCache, SolverCache, DEFAULT_SHRINK_LIMIT,
};
pub use diag::{CacheWarning, DiagnosticSink, MemorySink, TracingSink};
pub use error::{Error, Result};
pub use fingerprint::fingerprint;
pub use rng::{RngState, SolverRng, DEFAULT_SEED};
pub use solver::{Solution, Solver, SolverDefaults, SolverIdentity};
pub use stats::CacheStats;

pub use decostore::{CacheKey, InfoValue, Matrix, SolverInfo};

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
