//! # decostore
//!
//! On-disk store for decoder matrices with sidecar solver metadata.
//!
//! ## Architecture
//! - **Flat directory**: two files per entry named by cache key, no index
//! - **Blob files** (`.dmat`): versioned binary matrices
//! - **Info files** (`.meta`): versioned JSON solver diagnostics, optional
//! - **Atomic writes**: temp file plus rename, artifact before metadata

#![warn(missing_docs)]

mod matrix;
mod key;
mod blob;
mod info;
mod store;
mod error;

pub use error::{Error, Result};
pub use info::{InfoValue, SolverInfo};
pub use key::CacheKey;
pub use matrix::Matrix;
pub use store::{CacheEntry, DecoderStore, EntryStat, ARTIFACT_EXT, INFO_EXT};

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
