//! Error types for decocache

/// Result type alias for decocache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store-level failure: I/O, codec, or format versioning
    #[error(transparent)]
    Store(#[from] decostore::Error),

    /// The wrapped solver itself failed
    #[error("solver failed: {0}")]
    Solver(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wrap a solver's own error
    pub fn solver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Solver(Box::new(err))
    }
}
