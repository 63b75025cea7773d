//! Error types for decostore

use std::io;
use std::path::PathBuf;

/// Result type alias for decostore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure, tagged with the path it happened on
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Path the failing operation was touching
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Artifact blob failed to decode
    #[error("bad decoder blob: {0}")]
    Codec(String),

    /// Solver info record failed to encode or decode
    #[error("bad solver info: {0}")]
    Info(#[from] serde_json::Error),

    /// File carries a format version newer than this build understands
    #[error("unsupported format version {found} (newest supported is {supported})")]
    Version {
        /// Version found in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },

    /// String is not a valid cache key
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Codec(format!("{:?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_shows_path() {
        let err = Error::io("/tmp/cache/a.dmat", io::Error::new(io::ErrorKind::Other, "boom"));
        let msg = err.to_string();
        assert!(msg.contains("/tmp/cache/a.dmat"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_version_error_message() {
        let err = Error::Version {
            found: 9,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "unsupported format version 9 (newest supported is 1)"
        );
    }
}
